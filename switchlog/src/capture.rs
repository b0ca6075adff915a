//! Session transcripts: text captured from a switch CLI session.
//!
//! A transcript is split into one [`RawBlock`] per command at every line
//! that starts with the device prompt:
//!
//! ```text
//! sw1#show spanning-tree          <- command, starts a block
//! VLAN0001 ...                    <- output
//! sw1#show etherchannel summary   <- next command
//! ...
//! sw1#                            <- bare prompt ends the last block
//! ```
//!
//! The hostname in the prompt becomes the device id.

use std::fs;
use std::path::Path;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CaptureError;
use crate::template::RawBlock;

/// IOS-style prompt, optionally in a config mode, followed by a command.
///
/// Exec (`>`) and privileged (`#`) prompts are both accepted.
static PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<host>[\w.\-@/:]{1,63})(?:\(config[\w.\-@/:+]{0,63}\))?[>#]\s?(?P<command>.*)$")
        .unwrap()
});

/// Commands and outputs read from one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    hostname: String,
    blocks: Vec<RawBlock>,
}

impl Capture {
    /// Split a transcript into command blocks for `platform`.
    pub fn parse(text: &str, platform: &str) -> Result<Self, CaptureError> {
        let text = text.replace("\r\n", "\n");

        let mut hostname: Option<String> = None;
        let mut blocks: Vec<RawBlock> = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in text.lines() {
            let prompt = PROMPT.captures(line.trim_end()).filter(|caps| {
                hostname
                    .as_deref()
                    .is_none_or(|host| host == &caps["host"])
            });

            let Some(caps) = prompt else {
                if let Some((_, output)) = current.as_mut() {
                    output.push(line);
                }
                continue;
            };

            if hostname.is_none() {
                hostname = Some(caps["host"].to_string());
            }
            if let Some((command, output)) = current.take() {
                blocks.push(block(command, &output, platform));
            }

            let command = caps["command"].trim();
            if !command.is_empty() {
                current = Some((command.to_string(), Vec::new()));
            }
        }

        if let Some((command, output)) = current.take() {
            blocks.push(block(command, &output, platform));
        }

        if blocks.is_empty() {
            return Err(CaptureError::NoCommands);
        }
        let hostname = hostname.ok_or(CaptureError::NoDeviceId)?;

        debug!("Capture from {}: {} command(s)", hostname, blocks.len());
        Ok(Self { hostname, blocks })
    }

    /// Read and split a transcript file.
    pub fn from_file(path: impl AsRef<Path>, platform: &str) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, platform)
    }

    /// Hostname from the prompt, used as the device id.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn blocks(&self) -> &[RawBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<RawBlock> {
        self.blocks
    }
}

fn block(command: String, output: &[&str], platform: &str) -> RawBlock {
    RawBlock::new(command, output.join("\n")).with_platform(platform)
}
