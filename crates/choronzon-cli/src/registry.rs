//! Static format-plug-in registry: the `--format`/config `format` string is
//! matched against a small, fixed set of constructors rather than a
//! dynamically loaded plug-in system. `choronzon-png` is the only plug-in
//! shipped today; new plug-ins register here.

use choronzon_core::{ChoronzonError, ErrorInfo};
use choronzon_format::FormatPlugin;
use choronzon_png::PngPlugin;

/// Resolves a format name (as configured via `RunConfig::format`) to a
/// boxed plug-in instance, or a `ConfigError` if the name is unknown.
pub fn resolve(name: &str) -> Result<Box<dyn FormatPlugin>, ChoronzonError> {
    match name {
        "png" => Ok(Box::new(PngPlugin::new())),
        other => Err(ChoronzonError::Config(
            ErrorInfo::new("unknown-format", format!("no format plug-in named '{other}'"))
                .with_hint("known plug-ins: png"),
        )),
    }
}
