use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::EmbedError;

/// Resolve R home: explicit path, then `R_HOME`, then `R RHOME`
pub fn r_home(explicit: Option<&Path>) -> Result<PathBuf, EmbedError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(home) = std::env::var_os("R_HOME").filter(|v| !v.is_empty()) {
        debug!(?home, "R home from environment");
        return Ok(PathBuf::from(home));
    }

    let output = Command::new("R")
        .arg("RHOME")
        .output()
        .map_err(|_| EmbedError::RHomeNotFound)?;
    if !output.status.success() {
        return Err(EmbedError::RHomeNotFound);
    }

    let home = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if home.is_empty() {
        return Err(EmbedError::RHomeNotFound);
    }
    debug!(%home, "R home from `R RHOME`");
    Ok(PathBuf::from(home))
}

/// Platform location of the shared runtime below R home
pub fn library_path(r_home: &Path) -> PathBuf {
    let name = if cfg!(target_os = "macos") {
        "libR.dylib"
    } else {
        "libR.so"
    };
    r_home.join("lib").join(name)
}

/// Documentation, header and shared-data directories of an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RDirs {
    pub doc: PathBuf,
    pub include: PathBuf,
    pub share: PathBuf,
}

impl RDirs {
    /// Values for `R_DOC_DIR`, `R_INCLUDE_DIR` and `R_SHARE_DIR`
    pub fn env_vars(&self) -> [(&'static str, &Path); 3] {
        [
            ("R_DOC_DIR", self.doc.as_path()),
            ("R_INCLUDE_DIR", self.include.as_path()),
            ("R_SHARE_DIR", self.share.as_path()),
        ]
    }
}

/// Resolve the installation directories.
///
/// Distributions that split `doc`, `include` and `share` out of R home are
/// asked through `R --slave`; when that fails the R home layout is assumed.
pub fn r_dirs(r_home: &Path) -> RDirs {
    if let Some(dirs) = bundled_dirs(r_home) {
        return dirs;
    }

    let queried = Command::new(r_home.join("bin").join("R"))
        .args([
            "--slave",
            "-e",
            "cat(paste(R.home('doc'), R.home('include'), R.home('share'), sep=':'))",
        ])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| parse_dirs(&String::from_utf8_lossy(&output.stdout)));

    match queried {
        Some(dirs) => {
            debug!(?dirs, "R directories from `R --slave`");
            dirs
        }
        None => {
            debug!("cannot query R directories, assuming R home layout");
            home_layout(r_home)
        }
    }
}

fn home_layout(r_home: &Path) -> RDirs {
    RDirs {
        doc: r_home.join("doc"),
        include: r_home.join("include"),
        share: r_home.join("share"),
    }
}

/// The R home layout, if all three directories exist
pub fn bundled_dirs(r_home: &Path) -> Option<RDirs> {
    let dirs = home_layout(r_home);
    (dirs.doc.is_dir() && dirs.include.is_dir() && dirs.share.is_dir()).then_some(dirs)
}

/// Parse `doc:include:share` as printed by the query
pub fn parse_dirs(output: &str) -> Option<RDirs> {
    let mut parts = output.trim().split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(doc), Some(include), Some(share), None)
            if !doc.is_empty() && !include.is_empty() && !share.is_empty() =>
        {
            Some(RDirs {
                doc: PathBuf::from(doc),
                include: PathBuf::from(include),
                share: PathBuf::from(share),
            })
        }
        _ => None,
    }
}
