use std::path::{Component, Path};

use crate::error::{ForgeError, ForgeResult};
use crate::model::WorkflowSpec;

/// Validate a workflow spec before anything is synthesized or written.
///
/// `name` and `version` end up as directory names under the artifact root, so
/// each must be exactly one normal path component. That is what keeps two
/// distinct `(name, version)` pairs from ever sharing an artifact path.
pub fn validate_spec(spec: &WorkflowSpec) -> ForgeResult<()> {
    if !is_safe_component(&spec.name) {
        return Err(ForgeError::validation(format!(
            "name '{}' must be a single relative path component (no '/', '..' or empty)",
            spec.name
        )));
    }
    if !is_safe_component(&spec.version) {
        return Err(ForgeError::validation(format!(
            "version '{}' must be a single relative path component (no '/', '..' or empty)",
            spec.version
        )));
    }

    for (idx, tool) in spec.tools.iter().enumerate() {
        if tool.kind.trim().is_empty() {
            return Err(ForgeError::validation(format!("tools[{idx}]: kind must not be empty")));
        }
    }

    Ok(())
}

/// Returns true if `s` is one "normal" path component:
/// - not empty and not just whitespace
/// - no separators, so not absolute and not nested
/// - not `.` or `..`
pub fn is_safe_component(s: &str) -> bool {
    if s.trim().is_empty() || s.contains('/') || s.contains('\\') || s.contains('\0') {
        return false;
    }
    let mut components = Path::new(s).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
