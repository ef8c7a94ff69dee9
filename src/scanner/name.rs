use regex::Regex;
use std::path::Path;

lazy_static::lazy_static! {
    /// `<PREFIX>_<DIGITS>[_<SUFFIX>][~<TOKEN>].<EXT>`
    static ref MEDIA_NAME: Regex = Regex::new(
        r"^(?P<prefix>[A-Za-z]+)_(?P<index>\d{1,9})(?:_(?P<suffix>\d{1,3}))?(?:~(?P<token>[0-9A-Za-z]+))?\.(?P<ext>[A-Za-z0-9]+)$"
    )
    .expect("invalid media name regex");
}

/// Parsed components of a camera file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaName {
    pub prefix: String,
    pub index: u32,
    pub width: usize,
    pub collision_suffix: Option<u32>,
    pub staging_token: Option<String>,
    pub extension: String,
}

impl MediaName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = MEDIA_NAME.captures(file_name)?;
        let digits = &caps["index"];
        Some(Self {
            prefix: caps["prefix"].to_ascii_uppercase(),
            index: digits.parse().ok()?,
            width: digits.len(),
            collision_suffix: caps.name("suffix").and_then(|m| m.as_str().parse().ok()),
            staging_token: caps.name("token").map(|m| m.as_str().to_string()),
            extension: caps["ext"].to_ascii_lowercase(),
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::parse)
    }

    /// The clean name for position `index`: never carries a suffix or token.
    pub fn canonical_file_name(prefix: &str, index: u32, width: usize, extension: &str) -> String {
        format!("{}_{:0width$}.{}", prefix, index, extension, width = width)
    }

    /// Name for the `copy`-th byte-identical copy sharing a directory with
    /// the file at `index`.
    pub fn copy_file_name(
        prefix: &str,
        index: u32,
        width: usize,
        copy: u32,
        extension: &str,
    ) -> String {
        format!(
            "{}_{:0width$}_{}.{}",
            prefix,
            index,
            copy,
            extension,
            width = width
        )
    }

    /// Temporary name for this file during a rename run. Stays parseable so a
    /// file stranded here by an interrupted run is still recognized.
    pub fn staging_file_name(&self, token: &str) -> String {
        let suffix = self
            .collision_suffix
            .map(|s| format!("_{}", s))
            .unwrap_or_default();
        format!(
            "{}_{:0width$}{}~{}.{}",
            self.prefix,
            self.index,
            suffix,
            token,
            self.extension,
            width = self.width
        )
    }
}
