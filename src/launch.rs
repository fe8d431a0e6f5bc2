//! Launching the vanilla client and server
//!
//! Builds the `java` invocations the run tasks use. Command construction is
//! pure so it can be unit-tested; spawning inherits the caller's stdio the
//! way an interactive game launch expects.

use crate::error::{Error, Result};
use crate::tools;
use std::path::{Path, PathBuf};
use tracing::info;

/// Classpath separator for the current platform
const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Environment variable the JVM derives its default library search path from
const LIBRARY_PATH_VAR: &str = if cfg!(windows) {
    "PATH"
} else if cfg!(target_os = "macos") {
    "DYLD_LIBRARY_PATH"
} else {
    "LD_LIBRARY_PATH"
};

/// Development username used for offline launches
const DEV_USERNAME: &str = "Developer";

/// A fully constructed `java` invocation
#[derive(Clone, Debug)]
pub struct JavaInvocation {
    /// The java program (path or bare name resolved at spawn time)
    pub program: PathBuf,
    /// JVM arguments placed before the main class
    pub jvm_args: Vec<String>,
    /// Classpath entries in order
    pub classpath: Vec<PathBuf>,
    /// Fully qualified main class
    pub main_class: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Working directory for the spawned process
    pub working_dir: PathBuf,
}

impl JavaInvocation {
    /// The full argument vector after the program name
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.jvm_args.clone();
        argv.push("-cp".into());
        argv.push(
            self.classpath
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(CLASSPATH_SEPARATOR),
        );
        argv.push(self.main_class.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Spawn the invocation with inherited stdio and wait for it to exit
    pub async fn run(&self) -> Result<()> {
        let program = tools::resolve_program(&self.program)?;
        tokio::fs::create_dir_all(&self.working_dir).await?;
        info!(program = %program.display(), main = %self.main_class, "launching java");

        let status = tokio::process::Command::new(&program)
            .args(self.argv())
            .current_dir(&self.working_dir)
            .status()
            .await
            .map_err(|e| Error::ExternalTool {
                tool: program.display().to_string(),
                reason: format!("failed to start: {e}"),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: program.display().to_string(),
                reason: status.to_string(),
            })
        }
    }
}

/// Inputs for constructing the vanilla client launch
#[derive(Clone, Debug)]
pub struct ClientLaunch {
    /// java program (path or bare name)
    pub java: PathBuf,
    /// Verified vanilla client jar
    pub client_jar: PathBuf,
    /// Resolved library classpath, in dependency-resolution order
    pub libraries: Vec<PathBuf>,
    /// Directory holding the extracted native libraries
    pub natives_dir: PathBuf,
    /// Game run directory
    pub run_dir: PathBuf,
    /// Assets root (contains `indexes/` and `objects/`)
    pub assets_dir: PathBuf,
    /// Asset index identifier
    pub asset_index: String,
    /// Game version identifier
    pub version: String,
}

impl ClientLaunch {
    /// Build the client `java` invocation
    pub fn invocation(&self) -> JavaInvocation {
        let mut classpath = vec![self.client_jar.clone()];
        classpath.extend(self.libraries.iter().cloned());

        let inherited = std::env::var(LIBRARY_PATH_VAR).ok();
        JavaInvocation {
            program: self.java.clone(),
            jvm_args: vec![
                "-ea".into(),
                library_path_arg(&self.natives_dir, inherited.as_deref()),
            ],
            classpath,
            main_class: "net.minecraft.client.main.Main".into(),
            args: vec![
                "--username".into(),
                DEV_USERNAME.into(),
                "--version".into(),
                self.version.clone(),
                "--gameDir".into(),
                self.run_dir.display().to_string(),
                "--assetsDir".into(),
                self.assets_dir.display().to_string(),
                "--assetIndex".into(),
                self.asset_index.clone(),
                "--uuid".into(),
                offline_uuid(b"dev"),
                "--userProperties".into(),
                "{}".into(),
                "--accessToken".into(),
                "0".into(),
            ],
            working_dir: self.run_dir.clone(),
        }
    }
}

/// `-Djava.library.path` value: the natives directory first, then the
/// inherited search path so system libraries stay resolvable
fn library_path_arg(natives_dir: &Path, inherited: Option<&str>) -> String {
    let mut arg = format!("-Djava.library.path={}", natives_dir.display());
    if let Some(existing) = inherited.filter(|p| !p.is_empty()) {
        arg.push_str(CLASSPATH_SEPARATOR);
        arg.push_str(existing);
    }
    arg
}

/// Inputs for constructing the vanilla server launch
#[derive(Clone, Debug)]
pub struct ServerLaunch {
    /// java program (path or bare name)
    pub java: PathBuf,
    /// Verified vanilla server jar
    pub server_jar: PathBuf,
    /// Game run directory
    pub run_dir: PathBuf,
}

impl ServerLaunch {
    /// Build the headless server `java` invocation
    pub fn invocation(&self) -> JavaInvocation {
        JavaInvocation {
            program: self.java.clone(),
            jvm_args: vec!["-ea".into()],
            classpath: vec![self.server_jar.clone()],
            main_class: "net.minecraft.server.MinecraftServer".into(),
            args: vec!["nogui".into()],
            working_dir: self.run_dir.clone(),
        }
    }
}

/// Java-compatible name-based (version 3) UUID from raw name bytes
///
/// Matches `java.util.UUID.nameUUIDFromBytes`: an MD5 of the name with the
/// version and variant bits patched in, formatted hyphenated.
pub fn offline_uuid(name: &[u8]) -> String {
    let mut digest: [u8; 16] = md5::compute(name).into();
    digest[6] = (digest[6] & 0x0f) | 0x30;
    digest[8] = (digest[8] & 0x3f) | 0x80;
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3],
        digest[4], digest[5],
        digest[6], digest[7],
        digest[8], digest[9],
        digest[10], digest[11], digest[12], digest[13], digest[14], digest[15],
    )
}
