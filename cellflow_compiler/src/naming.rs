use once_cell::sync::Lazy;
use regex::Regex;

use cellflow_source::lexer::is_keyword;

use crate::error::CompileError;

static FIRST_CAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid first-cap regex"));
static ALL_CAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid all-cap regex"));

/// `KinectAzure` -> `kinect_azure`, `DobotM1` -> `dobot_m1`.
pub fn camel_case_to_snake_case(camel: &str) -> String {
    let first = FIRST_CAP_RE.replace_all(camel, "${1}_${2}");
    ALL_CAP_RE
        .replace_all(&first, "${1}_${2}")
        .to_lowercase()
}

/// `move_to_pose` -> `moveToPose`.
pub fn snake_case_to_camel_case(snake: &str) -> String {
    let mut parts = snake.split('_');
    let mut out = parts.next().unwrap_or_default().to_lowercase();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// Program variable name for a scene object id.
///
/// Not injective: `MyRobot` and `my_robot` both become `my_robot`; the
/// emitter rejects scenes where that happens.
pub fn object_variable_name(object_id: &str) -> String {
    let snake = camel_case_to_snake_case(object_id);
    let mut name: String = snake
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    if is_keyword(&name) {
        name.push('_');
    }
    name
}

/// Module that holds a user-defined object type, relative to the object
/// types package.
pub fn object_type_module(type_name: &str) -> String {
    camel_case_to_snake_case(type_name)
}

/// Splits a `module/Class` reference.
pub fn parse_type_reference(reference: &str) -> Result<(&str, &str), CompileError> {
    let invalid = || CompileError::InvalidTypeReference(reference.to_string());
    let (module, class) = reference.split_once('/').ok_or_else(invalid)?;
    if module.is_empty() || class.is_empty() || class.contains('/') {
        return Err(invalid());
    }
    Ok((module, class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_camel_case() {
        assert_eq!(camel_case_to_snake_case("Robot"), "robot");
        assert_eq!(camel_case_to_snake_case("KinectAzure"), "kinect_azure");
        assert_eq!(camel_case_to_snake_case("DobotM1"), "dobot_m1");
        assert_eq!(camel_case_to_snake_case("HTTPServer"), "http_server");
        assert_eq!(camel_case_to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn converts_snake_case() {
        assert_eq!(snake_case_to_camel_case("move_to_pose"), "moveToPose");
        assert_eq!(snake_case_to_camel_case("Home"), "home");
    }

    #[test]
    fn variable_names_are_valid_identifiers() {
        assert_eq!(object_variable_name("robot"), "robot");
        assert_eq!(object_variable_name("Box IN"), "box_in");
        assert_eq!(object_variable_name("MyRobot"), "my_robot");
        assert_eq!(object_variable_name("3dCamera"), "_3d_camera");
        assert_eq!(object_variable_name("class"), "class_");
        assert_eq!(object_variable_name("arm-1"), "arm_1");
    }

    #[test]
    fn type_references_need_module_and_class() {
        assert_eq!(
            parse_type_reference("object_types.robot/Robot").unwrap(),
            ("object_types.robot", "Robot")
        );
        assert!(parse_type_reference("Robot").is_err());
        assert!(parse_type_reference("a/").is_err());
    }
}
