use crate::status::AppType;
use serde_json::Value;

pub const COMPONENTS_SCHEMA_VERSION: u64 = 1;

/// Component names an application type cannot run without.
pub fn required_components(app_type: AppType) -> &'static [&'static str] {
    match app_type {
        AppType::MlInference => &["model"],
        AppType::StreamProcessing => &["source"],
        _ => &[],
    }
}

/// Checks an application's `components` map before it is stored.
///
/// The map is `{ "schema_version"?: 1, "<component>": { ... }, ... }`.
pub fn validate_components(app_type: AppType, components: &Value) -> Result<(), String> {
    let map = components
        .as_object()
        .ok_or_else(|| "components must be a JSON object".to_string())?;

    if let Some(version) = map.get("schema_version") {
        match version.as_u64() {
            Some(COMPONENTS_SCHEMA_VERSION) => {}
            _ => {
                return Err(format!(
                    "unsupported components schema_version {} (expected {})",
                    version, COMPONENTS_SCHEMA_VERSION
                ));
            }
        }
    }

    for (name, component) in map.iter().filter(|(k, _)| k.as_str() != "schema_version") {
        if !component.is_object() {
            return Err(format!("component '{}' must be a JSON object", name));
        }
    }

    for required in required_components(app_type) {
        if !map.contains_key(*required) {
            return Err(format!(
                "{:?} applications must declare a '{}' component",
                app_type, required
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_is_valid_for_plain_services() {
        assert!(validate_components(AppType::WebService, &json!({})).is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate_components(AppType::WebService, &json!([1, 2])).is_err());
        assert!(validate_components(AppType::WebService, &json!({"db": "postgres"})).is_err());
    }

    #[test]
    fn test_required_components_per_type() {
        assert!(validate_components(AppType::MlInference, &json!({})).is_err());
        assert!(
            validate_components(AppType::MlInference, &json!({"model": {"name": "resnet"}})).is_ok()
        );
        assert!(validate_components(AppType::StreamProcessing, &json!({"sink": {}})).is_err());
    }

    #[test]
    fn test_schema_version() {
        assert!(validate_components(AppType::BatchJob, &json!({"schema_version": 1})).is_ok());
        assert!(validate_components(AppType::BatchJob, &json!({"schema_version": 2})).is_err());
    }
}
