use std::path::{Path, PathBuf};

use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};

use crate::error::StartupError;

/// Downloads a model artifact from a remote blob store.
pub struct ModelFetcher {
    client: reqwest::Client,
}

impl Default for ModelFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl ModelFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` to `file_path` unless something already lives there.
    ///
    /// The body is streamed into a sibling `.temp` file which is renamed once
    /// complete, so an interrupted download never leaves a truncated model at
    /// `file_path`.
    pub async fn download_to_path_if_not_exists(
        &self,
        url: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<PathBuf, StartupError> {
        let file_path = file_path.as_ref().to_path_buf();
        info!("check model path: {:?}", file_path);
        if fs::try_exists(&file_path).await? {
            return Ok(file_path);
        }

        let fetch_error = |source| StartupError::Fetch {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(fetch_error)?;
        if !response.status().is_success() {
            return Err(StartupError::FetchStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        if let Some(parent_dir) = file_path.parent() {
            fs::create_dir_all(parent_dir).await?;
        }

        let temp_download_path = temp_path(&file_path);
        let written = async {
            let mut file = File::create(&temp_download_path).await?;
            while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, StartupError>(())
        }
        .await;

        if let Err(e) = written {
            warn!("download of {} failed, removing {:?}", url, temp_download_path);
            if let Err(rm) = fs::remove_file(&temp_download_path).await {
                debug!("could not remove {:?}: {}", temp_download_path, rm);
            }
            return Err(e);
        }
        fs::rename(&temp_download_path, &file_path).await?;

        info!("model {:?} downloaded from {}", file_path, url);

        Ok(file_path)
    }
}

fn temp_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(".temp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("caption-server-fetch-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test_log::test(tokio::test)]
    async fn downloads_missing_artifact() {
        let base = serve(Router::new().route("/models/caption.onnx", get(|| async { "model-bytes" }))).await;
        let target = scratch_path("nested/caption.onnx");

        let path = ModelFetcher::default()
            .download_to_path_if_not_exists(&format!("{}/models/caption.onnx", base), &target)
            .await
            .unwrap();

        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"model-bytes");
        assert!(!temp_path(&target).exists());
    }

    #[test_log::test(tokio::test)]
    async fn existing_artifact_is_not_refetched() {
        let target = scratch_path("caption.onnx");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"already here").unwrap();

        // nothing listens on port 1, so any request would fail
        let path = ModelFetcher::default()
            .download_to_path_if_not_exists("http://127.0.0.1:1/caption.onnx", &target)
            .await
            .unwrap();

        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"already here");
    }

    #[test_log::test(tokio::test)]
    async fn http_error_status_is_reported() {
        let base = serve(Router::new().route(
            "/missing.onnx",
            get(|| async { (StatusCode::NOT_FOUND, "no such blob") }),
        ))
        .await;
        let target = scratch_path("caption.onnx");

        let err = ModelFetcher::default()
            .download_to_path_if_not_exists(&format!("{}/missing.onnx", base), &target)
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::FetchStatus { status, .. } if status == reqwest::StatusCode::NOT_FOUND));
        assert!(!target.exists());
    }

    #[test_log::test(tokio::test)]
    async fn interrupted_body_leaves_nothing_behind() {
        // promises more bytes than it sends, then closes the connection
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1048576\r\n\r\npartial-model")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });
        let target = scratch_path("caption.onnx");

        let err = ModelFetcher::default()
            .download_to_path_if_not_exists(&format!("http://{}/caption.onnx", addr), &target)
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::Fetch { .. }), "{}", err);
        assert!(!temp_path(&target).exists());
        assert!(!target.exists());
    }

    #[test_log::test(tokio::test)]
    async fn unreachable_source_is_reported() {
        let target = scratch_path("caption.onnx");

        let err = ModelFetcher::default()
            .download_to_path_if_not_exists("http://127.0.0.1:1/caption.onnx", &target)
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::Fetch { .. }));
        assert!(!target.exists());
    }
}
