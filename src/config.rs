use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;

pub const HISTORY_FILE: &str = ".rterm_history";

/// rterm - interactive R console with shell passthrough
#[derive(Parser, Debug, Default)]
#[command(name = "rterm", disable_version_flag = true)]
pub struct Args {
    /// Print version information and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// R home directory (defaults to R_HOME, then `R RHOME`)
    #[arg(long, value_name = "DIR")]
    pub r_home: Option<PathBuf>,

    /// Don't print the startup message
    #[arg(short, long)]
    pub quiet: bool,

    /// Don't read the site and user environment files
    #[arg(long)]
    pub no_environ: bool,

    /// Don't read the site-wide Rprofile
    #[arg(long)]
    pub no_site_file: bool,

    /// Don't read the user R profile
    #[arg(long)]
    pub no_init_file: bool,

    /// Combine --no-history --no-environ --no-site-file --no-init-file
    #[arg(long)]
    pub vanilla: bool,

    /// Don't load or save any history file
    #[arg(long)]
    pub no_history: bool,

    /// Force using the history file in the current directory
    #[arg(long)]
    pub local_history: bool,

    /// Save the workspace at the end of the session
    #[arg(long)]
    pub save: bool,

    /// Ask whether to save the workspace at the end of the session
    #[arg(long)]
    pub ask_save: bool,

    /// Restore previously saved objects
    #[arg(long)]
    pub restore_data: bool,

    /// Don't print a blank line before each prompt
    #[arg(long)]
    pub no_insert_new_line: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    // Accepted for compatibility with R's own flags; never checked
    #[arg(long, hide = true)]
    pub no_save: bool,
    #[arg(long, hide = true)]
    pub no_restore_data: bool,
    #[arg(long, hide = true)]
    pub no_restore_history: bool,
    #[arg(long, hide = true)]
    pub no_restore: bool,
    #[arg(long, hide = true)]
    pub no_readline: bool,
    #[arg(long, hide = true)]
    pub interactive: bool,
}

impl Args {
    /// Apply `--vanilla`
    pub fn normalize(mut self) -> Self {
        if self.vanilla {
            self.no_history = true;
            self.no_environ = true;
            self.no_site_file = true;
            self.no_init_file = true;
        }
        self
    }

    /// Argument vector for the runtime's initialization
    pub fn runtime_args(&self) -> Vec<String> {
        let mut args = vec![
            "rterm".to_string(),
            "--quiet".to_string(),
            "--no-restore-history".to_string(),
        ];
        if !cfg!(windows) {
            args.push("--no-readline".to_string());
        }

        let flags = [
            (self.no_environ, "--no-environ"),
            (self.no_site_file, "--no-site-file"),
            (self.no_init_file, "--no-init-file"),
            (self.save, "--save"),
            (!self.ask_save && !self.save, "--no-save"),
            (!self.restore_data, "--no-restore-data"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );
        args
    }

    /// Startup-file variables emptied so the runtime skips those files
    pub fn blanked_env_vars(&self) -> Vec<&'static str> {
        let mut vars = Vec::new();
        if self.no_environ {
            vars.extend(["R_ENVIRON", "R_ENVIRON_USER"]);
        }
        if self.no_site_file {
            vars.push("R_PROFILE");
        }
        if self.no_init_file {
            vars.push("R_PROFILE_USER");
        }
        vars
    }

    /// Create the local history file when `--local-history` asks for one
    pub fn prepare_history(&self, cwd: &Path) -> io::Result<()> {
        if !self.local_history || self.no_history {
            return Ok(());
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(cwd.join(HISTORY_FILE))
            .map(drop)
    }

    /// History file for the line editor, if any
    pub fn history_path(&self, cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
        if self.no_history {
            return None;
        }
        let local = cwd.join(HISTORY_FILE);
        if self.local_history || local.exists() {
            return Some(local);
        }
        home.map(|h| h.join(HISTORY_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("rterm").chain(args.iter().copied()))
            .unwrap()
            .normalize()
    }

    #[test]
    fn default_runtime_args() {
        let args = parse(&[]).runtime_args();
        assert_eq!(args[..3], ["rterm", "--quiet", "--no-restore-history"]);
        assert!(args.contains(&"--no-save".to_string()));
        assert!(args.contains(&"--no-restore-data".to_string()));
        assert!(!args.contains(&"--no-environ".to_string()));
    }

    #[test]
    fn vanilla_implies_the_no_flags() {
        let args = parse(&["--vanilla"]);
        assert!(args.no_history);
        let runtime = args.runtime_args();
        for flag in ["--no-environ", "--no-site-file", "--no-init-file"] {
            assert!(runtime.contains(&flag.to_string()), "missing {flag}");
        }
    }

    #[test]
    fn saving_replaces_no_save() {
        let runtime = parse(&["--save", "--restore-data"]).runtime_args();
        assert!(runtime.contains(&"--save".to_string()));
        assert!(!runtime.contains(&"--no-save".to_string()));
        assert!(!runtime.contains(&"--no-restore-data".to_string()));

        let asking = parse(&["--ask-save"]).runtime_args();
        assert!(!asking.contains(&"--no-save".to_string()));
    }

    #[test]
    fn compatibility_flags_are_accepted() {
        let args = parse(&["--no-readline", "--interactive", "--no-restore"]);
        assert!(args.no_readline);
        assert_eq!(args.runtime_args().len(), parse(&[]).runtime_args().len());
    }

    #[test]
    fn history_location() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();

        let global = parse(&[]).history_path(cwd.path(), Some(home.path()));
        assert_eq!(global, Some(home.path().join(HISTORY_FILE)));

        let forced = parse(&["--local-history"]).history_path(cwd.path(), Some(home.path()));
        assert_eq!(forced, Some(cwd.path().join(HISTORY_FILE)));

        std::fs::write(cwd.path().join(HISTORY_FILE), "").unwrap();
        let existing = parse(&[]).history_path(cwd.path(), Some(home.path()));
        assert_eq!(existing, Some(cwd.path().join(HISTORY_FILE)));

        assert_eq!(parse(&["--vanilla"]).history_path(cwd.path(), None), None);
    }

    #[test]
    fn skipped_startup_files_blank_their_variables() {
        assert!(parse(&[]).blanked_env_vars().is_empty());
        assert_eq!(
            parse(&["--vanilla"]).blanked_env_vars(),
            ["R_ENVIRON", "R_ENVIRON_USER", "R_PROFILE", "R_PROFILE_USER"]
        );
        assert_eq!(parse(&["--no-init-file"]).blanked_env_vars(), ["R_PROFILE_USER"]);
    }

    #[test]
    fn local_history_file_is_created() {
        let cwd = tempfile::tempdir().unwrap();
        let local = cwd.path().join(HISTORY_FILE);

        parse(&[]).prepare_history(cwd.path()).unwrap();
        assert!(!local.exists());

        std::fs::write(&local, "x <- 1\n").unwrap();
        parse(&["--local-history"]).prepare_history(cwd.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "x <- 1\n");

        std::fs::remove_file(&local).unwrap();
        parse(&["--local-history"]).prepare_history(cwd.path()).unwrap();
        assert!(local.exists());
    }
}
