//! Automation script rendering.

use std::fs;
use std::path::Path;

use crate::manifest::DriverSettings;
use crate::BuildError;

/// Text fragments the driver script is stitched from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverFragments {
    pub includes: String,
    pub header: String,
    pub script: String,
    pub close: String,
}

impl DriverFragments {
    /// Read the four fragments, resolving relative paths against `base`.
    pub fn load(settings: &DriverSettings, base: &Path) -> Result<Self, BuildError> {
        let read = |p: &Path| {
            let path = base.join(p);
            fs::read_to_string(&path).map_err(|source| BuildError::Io { path, source })
        };
        Ok(Self {
            includes: read(&settings.includes)?,
            header: read(&settings.header)?,
            script: read(&settings.script)?,
            close: read(&settings.close)?,
        })
    }
}

/// Render the script that recompiles every named script in the editor.
///
/// Static names come first, then `generated` in the order given.
pub fn render_driver_script<'a, I>(
    fragments: &DriverFragments,
    set: &str,
    static_scripts: &'a [String],
    generated: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::with_capacity(fragments.includes.len() + fragments.header.len());
    out.push_str(&fragments.includes);
    out.push_str(&format!("\n$ingrs_set = \"{set}\"\n\n"));
    out.push_str(&fragments.header);
    let names = static_scripts.iter().map(String::as_str).chain(generated);
    for name in names {
        out.push_str(&format!("\n$script = \"{name}\"\n"));
        out.push_str(&fragments.script);
    }
    out.push_str(&fragments.close);
    out
}
