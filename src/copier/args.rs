//! Keyword-argument parsing for the copy and install surfaces.
//!
//! Parsing is a pure function from an argument list to a
//! [`CopyInvocation`]; the parser state lives only for the duration of the
//! call.
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::permissions::Mode;
use crate::platform::{Platform, drive_prefix_len};
use crate::rules::{MatchRule, MatchRuleSet};

use super::types::{
    CopyInvocation, CopyMode, CopyPolicy, CopySpec, MessageMode, PermissionPolicy, TargetType,
};

/// Collaborators needed to resolve relative paths and defaults.
#[derive(Debug, Clone, Copy)]
pub struct CopyContext<'a> {
    /// Platform for case folding, drive letters and permission keywords.
    pub platform: &'a Platform,
    /// Directories and install defaults.
    pub config: &'a DeployConfig,
}

/// Parse `copy` arguments.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for any malformed invocation.
pub fn parse_copy_args(args: &[String], ctx: CopyContext<'_>) -> Result<CopyInvocation> {
    parse(CopyMode::Copy, args, ctx)
}

/// Parse `install` arguments, applying DESTDIR redirection.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for any malformed invocation.
pub fn parse_install_args(
    args: &[String],
    ctx: CopyContext<'_>,
) -> Result<CopyInvocation> {
    parse(CopyMode::Install, args, ctx)
}

fn parse(mode: CopyMode, args: &[String], ctx: CopyContext<'_>) -> Result<CopyInvocation> {
    let mut parser = Parser::new(mode, ctx);
    for arg in args {
        parser.accept(arg)?;
    }
    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Doing {
    Nothing,
    Files,
    Destination,
    FilesFromDir,
    Pattern,
    Regex,
    RulePermissions,
    FilePermissions,
    DirPermissions,
    Type,
    Rename,
}

struct Parser<'a> {
    ctx: CopyContext<'a>,
    mode: CopyMode,
    doing: Doing,
    files: Vec<String>,
    destination: Option<String>,
    files_from_dir: Option<String>,
    rename: Option<String>,
    rules: Vec<MatchRule>,
    file_mode: Option<Mode>,
    dir_mode: Option<Mode>,
    use_source: bool,
    matchless_excluded: bool,
    optional: bool,
    messages: Option<(&'static str, MessageMode)>,
    target_type: TargetType,
}

impl<'a> Parser<'a> {
    fn new(mode: CopyMode, ctx: CopyContext<'a>) -> Self {
        Self {
            ctx,
            mode,
            doing: Doing::Files,
            files: Vec::new(),
            destination: None,
            files_from_dir: None,
            rename: None,
            rules: Vec::new(),
            file_mode: None,
            dir_mode: None,
            use_source: mode == CopyMode::Copy,
            matchless_excluded: false,
            optional: false,
            messages: None,
            target_type: TargetType::File,
        }
    }

    fn accept(&mut self, arg: &str) -> Result<()> {
        if self.keyword(arg)? {
            return Ok(());
        }
        self.value(arg)
    }

    fn not_before_match(&self, arg: &str) -> DeployError {
        DeployError::argument(format!(
            "{} option {arg} may not appear before PATTERN or REGEX.",
            self.mode
        ))
    }

    fn not_after_match(&self, arg: &str) -> Result<()> {
        if self.rules.is_empty() {
            Ok(())
        } else {
            Err(DeployError::argument(format!(
                "{} option {arg} may not appear after PATTERN or REGEX.",
                self.mode
            )))
        }
    }

    /// Handle `arg` if it is a keyword. Returns `false` for values.
    fn keyword(&mut self, arg: &str) -> Result<bool> {
        if self.mode == CopyMode::Install && self.install_keyword(arg)? {
            return Ok(true);
        }
        match arg {
            "DESTINATION" => {
                self.not_after_match(arg)?;
                self.doing = Doing::Destination;
            }
            "FILES_FROM_DIR" => {
                self.not_after_match(arg)?;
                self.doing = Doing::FilesFromDir;
            }
            "PATTERN" => self.doing = Doing::Pattern,
            "REGEX" => self.doing = Doing::Regex,
            "EXCLUDE" => {
                let rule = self.rules.pop().ok_or_else(|| self.not_before_match(arg))?;
                self.rules.push(rule.excluding());
                self.doing = Doing::Nothing;
            }
            "PERMISSIONS" => {
                if self.rules.is_empty() {
                    return Err(self.not_before_match(arg));
                }
                self.doing = Doing::RulePermissions;
            }
            "FILE_PERMISSIONS" => {
                self.not_after_match(arg)?;
                self.file_mode.get_or_insert(Mode::NONE);
                self.doing = Doing::FilePermissions;
            }
            "DIRECTORY_PERMISSIONS" => {
                self.not_after_match(arg)?;
                self.dir_mode.get_or_insert(Mode::NONE);
                self.doing = Doing::DirPermissions;
            }
            "USE_SOURCE_PERMISSIONS" => {
                self.not_after_match(arg)?;
                self.use_source = true;
                self.doing = Doing::Nothing;
            }
            "NO_SOURCE_PERMISSIONS" => {
                self.not_after_match(arg)?;
                self.use_source = false;
                self.doing = Doing::Nothing;
            }
            "FILES_MATCHING" => {
                self.not_after_match(arg)?;
                self.matchless_excluded = true;
                self.doing = Doing::Nothing;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn install_keyword(&mut self, arg: &str) -> Result<bool> {
        match arg {
            "TYPE" => {
                self.not_after_match(arg)?;
                self.doing = Doing::Type;
            }
            "FILES" => {
                self.not_after_match(arg)?;
                self.doing = Doing::Files;
            }
            "PROGRAMS" => {
                self.not_after_match(arg)?;
                self.target_type = TargetType::Program;
                self.doing = Doing::Files;
            }
            "RENAME" => {
                self.not_after_match(arg)?;
                self.doing = Doing::Rename;
            }
            "OPTIONAL" => {
                self.not_after_match(arg)?;
                self.optional = true;
                self.doing = Doing::Nothing;
            }
            "MESSAGE_ALWAYS" => self.message_mode("MESSAGE_ALWAYS", MessageMode::Always)?,
            "MESSAGE_LAZY" => self.message_mode("MESSAGE_LAZY", MessageMode::Lazy)?,
            "MESSAGE_NEVER" => self.message_mode("MESSAGE_NEVER", MessageMode::Never)?,
            "PERMISSIONS" if self.rules.is_empty() => {
                self.file_mode.get_or_insert(Mode::NONE);
                self.doing = Doing::FilePermissions;
            }
            "DIR_PERMISSIONS" => {
                self.not_after_match(arg)?;
                self.dir_mode.get_or_insert(Mode::NONE);
                self.doing = Doing::DirPermissions;
            }
            "COMPONENTS" | "CONFIGURATIONS" | "PROPERTIES" => {
                return Err(DeployError::argument(format!(
                    "INSTALL called with old-style {arg} argument. \
                     This invocation was generated by an older release; regenerate it with this version."
                )));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn message_mode(&mut self, arg: &'static str, mode: MessageMode) -> Result<()> {
        self.not_after_match(arg)?;
        if let Some((previous, _)) = self.messages {
            return Err(DeployError::argument(format!(
                "INSTALL options {previous} and {arg} are mutually exclusive."
            )));
        }
        self.messages = Some((arg, mode));
        self.doing = Doing::Nothing;
        Ok(())
    }

    fn value(&mut self, arg: &str) -> Result<()> {
        match self.doing {
            Doing::Files => self.files.push(arg.to_string()),
            Doing::Destination => {
                self.destination = Some(arg.to_string());
                self.doing = Doing::Nothing;
            }
            Doing::FilesFromDir => {
                let resolved = self.ctx.platform.resolve(&self.ctx.config.source_dir, arg);
                self.files_from_dir = Some(resolved);
                self.doing = Doing::Nothing;
            }
            Doing::Pattern => {
                self.rules.push(MatchRule::pattern(arg, self.ctx.platform)?);
                self.doing = Doing::Nothing;
            }
            Doing::Regex => {
                self.rules.push(MatchRule::regex(arg, self.ctx.platform)?);
                self.doing = Doing::Nothing;
            }
            Doing::RulePermissions => {
                let mode = self.permission(arg)?;
                if let Some(rule) = self.rules.pop() {
                    self.rules.push(rule.with_permissions(mode));
                }
            }
            Doing::FilePermissions => {
                let mode = self.permission(arg)?;
                self.file_mode = Some(self.file_mode.unwrap_or_default() | mode);
            }
            Doing::DirPermissions => {
                let mode = self.permission(arg)?;
                self.dir_mode = Some(self.dir_mode.unwrap_or_default() | mode);
            }
            Doing::Type => {
                self.target_type = arg.parse()?;
                self.doing = Doing::Nothing;
            }
            Doing::Rename => {
                self.rename = Some(arg.to_string());
                self.doing = Doing::Nothing;
            }
            Doing::Nothing => {
                return Err(DeployError::argument(format!(
                    "{} given unknown argument \"{arg}\".",
                    self.mode
                )));
            }
        }
        Ok(())
    }

    fn permission(&self, token: &str) -> Result<Mode> {
        self.ctx.platform.permissions.lookup(token).ok_or_else(|| {
            DeployError::argument(format!(
                "{} given invalid permission \"{token}\".",
                self.mode
            ))
        })
    }

    fn finish(self) -> Result<CopyInvocation> {
        let Some(raw_destination) = self.destination.clone() else {
            return Err(DeployError::argument(format!(
                "{} given no DESTINATION",
                self.mode
            )));
        };

        let mut policy = match self.mode {
            CopyMode::Copy => CopyPolicy::copy(),
            CopyMode::Install => {
                let mut p = CopyPolicy::install(self.target_type);
                p.always = self.ctx.config.install_always;
                p.optional = self.optional;
                p.messages = self.messages.map_or(MessageMode::Default, |(_, m)| m);
                p
            }
        };

        let destination = if self.mode == CopyMode::Install {
            self.validate_rename()?;
            let (destination, destdir_len) = self.install_destination(&raw_destination)?;
            policy.destdir_len = destdir_len;
            destination
        } else {
            self.ctx
                .platform
                .resolve(&self.ctx.config.binary_dir, &raw_destination)
        };

        let default_file = match self.mode {
            CopyMode::Copy => Mode::DEFAULT_FILE,
            CopyMode::Install => self
                .target_type
                .default_file_mode(self.ctx.config.install_so_no_exe),
        };
        let file_permissions = match (self.file_mode, self.use_source) {
            (Some(mode), _) => PermissionPolicy::Explicit(mode),
            (None, true) => PermissionPolicy::UseSource,
            (None, false) => PermissionPolicy::ExplicitDefault(default_file),
        };
        let dir_permissions = match (self.dir_mode, self.use_source) {
            (Some(mode), _) => PermissionPolicy::Explicit(mode),
            (None, true) => PermissionPolicy::UseSource,
            (None, false) => PermissionPolicy::ExplicitDefault(Mode::DEFAULT_DIRECTORY),
        };

        Ok(CopyInvocation {
            spec: CopySpec {
                files: self.files,
                destination,
                files_from_dir: self.files_from_dir,
                rename: self.rename,
                file_permissions,
                dir_permissions,
            },
            rules: MatchRuleSet::new(self.rules, self.matchless_excluded),
            policy,
        })
    }

    fn validate_rename(&self) -> Result<()> {
        if self.rename.is_none() {
            return Ok(());
        }
        if self.files_from_dir.is_some() {
            return Err(DeployError::argument(
                "INSTALL option RENAME may not be combined with FILES_FROM_DIR.",
            ));
        }
        if !matches!(self.target_type, TargetType::File | TargetType::Program) {
            return Err(DeployError::argument(
                "INSTALL option RENAME may be used only with FILES or PROGRAMS.",
            ));
        }
        if self.files.len() > 1 {
            return Err(DeployError::argument(
                "INSTALL option RENAME may be used only with one file.",
            ));
        }
        Ok(())
    }

    fn install_destination(&self, raw: &str) -> Result<(String, usize)> {
        let (destination, destdir_len) = match self.ctx.config.destdir() {
            Some(destdir) => apply_destdir(raw, destdir, self.ctx.platform)?,
            None => (
                self.ctx.platform.resolve(&self.ctx.config.binary_dir, raw),
                0,
            ),
        };
        if destination.len() < 2 && destination != "/" {
            return Err(DeployError::argument(
                "INSTALL called with inappropriate arguments. No DESTINATION provided or .",
            ));
        }
        Ok((destination, destdir_len))
    }
}

/// Rewrite an absolute `destination` under the `destdir` redirect root.
///
/// Returns the rewritten destination and the number of leading characters
/// that belong to the redirect root.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for a relative or network-style
/// destination.
pub fn apply_destdir(
    destination: &str,
    destdir: &str,
    platform: &Platform,
) -> Result<(String, usize)> {
    if destination.starts_with("//") || destination.starts_with("\\\\") {
        return Err(DeployError::argument(format!(
            "INSTALL called with network path DESTINATION. This does not make sense \
             when using DESTDIR. Specify local absolute path or remove DESTDIR \
             environment variable.\nDESTINATION=\n{destination}"
        )));
    }
    if !platform.is_full_path(destination) {
        return Err(DeployError::argument(
            "INSTALL called with relative DESTINATION. This does not make sense when \
             using DESTDIR. Specify absolute path or remove DESTDIR environment variable.",
        ));
    }
    let skip = if platform.drive_letters {
        drive_prefix_len(destination)
    } else {
        0
    };
    let destdir = destdir.replace('\\', "/");
    let rest = destination.get(skip..).unwrap_or_default();
    Ok((format!("{destdir}{rest}"), destdir.len()))
}
