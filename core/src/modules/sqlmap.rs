use std::path::Path;

use log::warn;
use serde_json::{Map, Value};

use crate::utils::validator::OptionValue;

/// Renders one option as a discrete argv token. `true` becomes a bare flag,
/// `false` is dropped, everything else is `--key=value` taken verbatim.
pub fn render_option(key: &str, value: &OptionValue) -> Option<String> {
    match value {
        OptionValue::Flag(true) => Some(format!("--{}", key)),
        OptionValue::Flag(false) => None,
        OptionValue::Number(n) => Some(format!("--{}={}", key, n)),
        OptionValue::Text(s) => Some(format!("--{}={}", key, s)),
    }
}

/// Builds the sqlmap argument vector for one job.
///
/// Order is fixed: target and batch flags, the profile's preset arguments,
/// the output directory, then user options in the order they were given.
/// No shell is involved, so values need no quoting; `options` must already
/// have passed validation.
pub fn build_scan_args(
    target: &str,
    profile_args: &Map<String, Value>,
    output_dir: &Path,
    options: &[(String, OptionValue)],
) -> Vec<String> {
    let mut args = vec!["-u".to_string(), target.to_string(), "--batch".to_string()];

    for (key, raw) in profile_args {
        match OptionValue::from_json(raw) {
            Some(value) => args.extend(render_option(key, &value)),
            None => warn!("Ignoring non-scalar profile argument '{}'", key),
        }
    }

    args.push(format!("--output-dir={}", output_dir.display()));

    for (key, value) in options {
        args.extend(render_option(key, value));
    }

    args
}
