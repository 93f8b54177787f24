//! Pure rendering of the launchd property list and the helper script

use std::path::{Path, PathBuf};

use shlex::QuoteError;

use crate::process::quote;

/// `hidutil` mapping of Right Command (usage 0x7000000e7) onto F18
/// (usage 0x70000006d), which the input source switcher is bound to.
/// Written verbatim into the helper script.
pub const REMAP_PAYLOAD: &str = r#"{"UserKeyMapping":[{"HIDKeyboardModifierMappingSrc":0x7000000e7,"HIDKeyboardModifierMappingDst":0x70000006d}]}"#;

const HIDUTIL: &str = "hidutil";

/// A launchd agent descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub run_at_load: bool,
    /// Where the descriptor is installed
    pub install_path: PathBuf,
}

impl ServiceDescriptor {
    /// Descriptor that runs `script` once when loaded
    pub fn for_script(label: &str, script: &Path, install_path: PathBuf) -> Self {
        Self {
            label: label.to_string(),
            program_arguments: vec![script.to_string_lossy().into_owned()],
            run_at_load: true,
            install_path,
        }
    }

    /// Render the XML property list
    pub fn render(&self) -> String {
        let mut plist = String::new();
        plist.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        plist.push_str(
            "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
             \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
        );
        plist.push_str("<plist version=\"1.0\">\n<dict>\n");

        plist.push_str("\t<key>Label</key>\n");
        plist.push_str(&format!("\t<string>{}</string>\n", quote::xml_escape(&self.label)));

        plist.push_str("\t<key>ProgramArguments</key>\n\t<array>\n");
        for arg in &self.program_arguments {
            plist.push_str(&format!("\t\t<string>{}</string>\n", quote::xml_escape(arg)));
        }
        plist.push_str("\t</array>\n");

        plist.push_str("\t<key>RunAtLoad</key>\n");
        plist.push_str(if self.run_at_load { "\t<true/>\n" } else { "\t<false/>\n" });

        plist.push_str("</dict>\n</plist>\n");
        plist
    }
}

/// The `/bin/sh` script launchd runs to apply the key mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperScript {
    payload: String,
}

impl HelperScript {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn render(&self) -> Result<String, QuoteError> {
        let command = quote::shell_join([HIDUTIL, "property", "--set", self.payload.as_str()])?;
        Ok(format!("#!/bin/sh\n{command}\n"))
    }
}

impl Default for HelperScript {
    fn default() -> Self {
        Self::new(REMAP_PAYLOAD)
    }
}
