use crate::error::{Result, SessionError};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const SCRIPT_PLACEHOLDER: &str = "{script}";
const SCRIPT_PREFIX: &str = "toolsession_script_";

pub fn check_template(template: &str) -> Result<()> {
    if template.contains(SCRIPT_PLACEHOLDER) {
        Ok(())
    } else {
        Err(SessionError::InvalidRequest(format!(
            "script wrapper must contain {SCRIPT_PLACEHOLDER}"
        )))
    }
}

/// Script body written to a uniquely named file in the tool's working
/// directory. The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedScript {
    file: NamedTempFile,
}

impl StagedScript {
    pub fn stage(dir: &Path, body: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(SCRIPT_PREFIX)
            .tempfile_in(dir)
            .map_err(|err| {
                SessionError::TempFile(format!(
                    "cannot create script file in '{}': {err}",
                    dir.display()
                ))
            })?;
        let write_result = file
            .write_all(body.as_bytes())
            .and_then(|()| {
                if body.ends_with('\n') {
                    Ok(())
                } else {
                    file.write_all(b"\n")
                }
            })
            .and_then(|()| file.flush());
        write_result.map_err(|err| {
            SessionError::TempFile(format!(
                "cannot write script file '{}': {err}",
                file.path().display()
            ))
        })?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Wrapper command with every placeholder replaced by the staged path.
    pub fn render(&self, template: &str) -> String {
        template.replace(SCRIPT_PLACEHOLDER, &self.path().to_string_lossy())
    }
}
