//! The [`Engine`] trait: the raw capability surface of a media engine.
//!
//! An engine owns a private namespace of virtual files and runs
//! ffmpeg-style argument vectors against it. Lifecycle rules (idempotent
//! load, one command at a time, terminate-once) are enforced by
//! [`EngineHandle`](crate::EngineHandle), not by implementors.

use async_trait::async_trait;
use bytes::Bytes;

/// Callback receiving progress of the running command, in `[0, 1]`.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// A media-processing engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short name for logs (e.g. "ffmpeg").
    fn name(&self) -> &'static str;

    /// Bring the engine up. Called at most once per engine by the handle.
    async fn load(&self) -> st_core::Result<()>;

    /// Write `data` under the virtual `name`, replacing any existing file.
    async fn write_file(&self, name: &str, data: Bytes) -> st_core::Result<()>;

    /// Run one command. `progress` may be called any number of times.
    async fn exec(&self, args: &[String], progress: ProgressFn<'_>) -> st_core::Result<()>;

    /// Read a virtual file. Absent names yield [`st_core::Error::NotFound`].
    async fn read_file(&self, name: &str) -> st_core::Result<Bytes>;

    /// Delete a virtual file. Absent names yield [`st_core::Error::NotFound`].
    async fn delete_file(&self, name: &str) -> st_core::Result<()>;

    /// Release every resource held by the engine.
    fn terminate(&self);
}

/// Render an argument vector for log lines and error messages.
pub fn render_args(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("{a:?}")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_quotes_whitespace() {
        let args: Vec<String> = ["-i", "my clip.mp4", "-t", "3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(render_args(&args), r#"-i "my clip.mp4" -t 3"#);
    }
}
