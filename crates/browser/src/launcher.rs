//! Chrome process launcher
//!
//! Starts Chrome with `--remote-debugging-port=0` and reads the browser
//! WebSocket URL from the "DevTools listening on ..." line Chrome prints to
//! stderr, so no port has to be reserved up front.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::error::{BrowserError, Result};

/// Flags applied to every launch
///
/// Site isolation is switched off so cross-site iframes stay in the page's
/// renderer process and their documents are reachable from the top target.
pub const DEFAULT_ARGS: &[&str] = &[
    "--disable-web-security",
    "--disable-site-isolation-trials",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI",
    "--no-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-ipc-flooding-protection",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--window-size=2000,2000",
];

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Chrome binary; searched in well-known locations when unset
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Fresh temporary profile when unset
    pub user_data_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub startup_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            user_data_dir: None,
            extra_args: Vec::new(),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ChromeLauncher {
    options: LaunchOptions,
}

/// A running Chrome; killed when dropped
pub struct ChromeProcess {
    child: Child,
    ws_url: String,
    /// Temporary profile to remove on shutdown
    temp_profile: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }

    /// Well-known install locations, then `PATH`
    pub fn find_executable() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        let paths: &[&str] = &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        #[cfg(target_os = "windows")]
        let paths: &[&str] = &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let paths: &[&str] = &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];

        if let Some(found) = paths.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Some(found);
        }

        let names = ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"];
        let search = std::env::var_os("PATH")?;
        std::env::split_paths(&search)
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .find(|p| p.is_file())
    }

    /// Full argument list for a launch
    pub fn args(&self, user_data_dir: &std::path::Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", user_data_dir.display()),
        ];
        args.extend(DEFAULT_ARGS.iter().map(|a| a.to_string()));
        if self.options.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.options.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }

    pub async fn launch(&self) -> Result<ChromeProcess> {
        let executable = self
            .options
            .executable
            .clone()
            .or_else(Self::find_executable)
            .ok_or_else(|| BrowserError::Launch("Chrome executable not found".to_string()))?;

        let (user_data_dir, temp_profile) = match &self.options.user_data_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let dir = std::env::temp_dir().join(format!("jsonfy-profile-{}", Uuid::now_v7()));
                (dir.clone(), Some(dir))
            }
        };
        std::fs::create_dir_all(&user_data_dir)?;

        tracing::info!("Launching {} (headless: {})", executable.display(), self.options.headless);

        let mut child = Command::new(&executable)
            .args(self.args(&user_data_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {}", executable.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::Launch("stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(self.options.startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = parse_devtools_url(&line) {
                    return Ok(Some(url));
                }
                tracing::trace!("chrome: {}", line);
            }
            Ok::<_, std::io::Error>(None)
        })
        .await
        .map_err(|_| BrowserError::Launch("timed out waiting for DevTools endpoint".to_string()))??
        .ok_or_else(|| BrowserError::Launch("Chrome exited before opening DevTools".to_string()))?;

        // Keep draining so Chrome never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!("chrome: {}", line);
            }
        });

        tracing::info!("Chrome DevTools at {}", ws_url);
        Ok(ChromeProcess {
            child,
            ws_url,
            temp_profile,
        })
    }
}

impl ChromeProcess {
    /// Browser-level WebSocket endpoint
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn kill(mut self) -> Result<()> {
        self.child.kill().await?;
        if let Some(dir) = self.temp_profile.take() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                tracing::debug!("Failed to remove profile {}: {}", dir.display(), e);
            }
        }
        Ok(())
    }
}

/// Extract the endpoint from a "DevTools listening on ws://..." line
pub fn parse_devtools_url(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_PREFIX)?;
    let url = rest.split_whitespace().next()?;
    (url.starts_with("ws://") || url.starts_with("wss://")).then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devtools_url() {
        assert_eq!(
            parse_devtools_url("DevTools listening on ws://127.0.0.1:39717/devtools/browser/4b2c-11"),
            Some("ws://127.0.0.1:39717/devtools/browser/4b2c-11".to_string())
        );
        assert_eq!(parse_devtools_url("[1017/120000.1:ERROR:gpu_init.cc] oops"), None);
        assert_eq!(parse_devtools_url("DevTools listening on http://x"), None);
    }

    #[test]
    fn test_args() {
        let launcher = ChromeLauncher::new(LaunchOptions {
            extra_args: vec!["--lang=en-US".into()],
            ..LaunchOptions::default()
        });
        let args = launcher.args(std::path::Path::new("/tmp/profile"));

        assert_eq!(args[0], "--remote-debugging-port=0");
        assert_eq!(args[1], "--user-data-dir=/tmp/profile");
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_headful_omits_headless_flag() {
        let launcher = ChromeLauncher::new(LaunchOptions {
            headless: false,
            ..LaunchOptions::default()
        });
        assert!(!launcher.args(std::path::Path::new("/p")).iter().any(|a| a.starts_with("--headless")));
    }

    #[tokio::test]
    #[ignore] // Needs Chrome installed
    async fn test_launch_and_kill() {
        let process = ChromeLauncher::new(LaunchOptions::default()).launch().await.unwrap();
        assert!(process.ws_url().starts_with("ws://"));
        process.kill().await.unwrap();
    }
}
