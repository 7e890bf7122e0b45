use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use rand::rngs::StdRng;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{Config, MAX_PER_PAGE};
use crate::error::{ConfigError, FetchError, SearchError};

/// A remote clip that has not been downloaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipCandidate {
    pub id: u64,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Hd,
    Sd,
}

impl Quality {
    /// Pixel width of the stream that represents this tier.
    pub fn width(self) -> u32 {
        match self {
            Quality::Hd => 1920,
            Quality::Sd => 1280,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Quality::Hd => "hd",
            Quality::Sd => "sd",
        }
    }
}

impl FromStr for Quality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hd" => Ok(Quality::Hd),
            "sd" => Ok(Quality::Sd),
            _ => Err(ConfigError::UnsupportedQuality(s.to_string())),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait FootageSource: Send + Sync {
    /// Ids from the first randomly chosen page that has any results.
    async fn search(
        &mut self,
        topic: &str,
        per_page: u32,
        pages: u32,
    ) -> Result<Vec<ClipCandidate>, SearchError>;

    /// Downloads the candidate into `dest_dir` and returns the file path.
    async fn fetch(
        &self,
        candidate: &ClipCandidate,
        quality: Quality,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError>;
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    videos: Vec<SearchVideo>,
}

#[derive(Debug, Deserialize)]
struct SearchVideo {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct VideoDetail {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    width: Option<u32>,
    link: String,
}

pub struct PexelsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    download_timeout: Duration,
    rng: StdRng,
}

impl PexelsClient {
    pub fn new(config: &Config, rng: StdRng) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.pexels_url.clone(),
            api_key: config.api_key.clone(),
            download_timeout: config.download_timeout,
            rng,
        }
    }

    async fn download(&self, url: &str, out_path: &Path) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(out_path).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("Wrote {} bytes to {}", written, out_path.display());
        Ok(())
    }
}

#[async_trait]
impl FootageSource for PexelsClient {
    async fn search(
        &mut self,
        topic: &str,
        per_page: u32,
        pages: u32,
    ) -> Result<Vec<ClipCandidate>, SearchError> {
        if per_page > MAX_PER_PAGE {
            return Err(SearchError::PerPageTooLarge(per_page));
        }
        let url = format!("{}/v1/videos/search", self.base_url);

        for _ in 0..pages {
            let page = self.rng.gen_range(1..=pages);
            info!("Fetching ids for '{}' from page {}", topic, page);
            let res: SearchPage = self
                .client
                .get(&url)
                .header(AUTHORIZATION, &self.api_key)
                .query(&[
                    ("query", topic.to_string()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if !res.videos.is_empty() {
                debug!("Page {} returned {} videos", page, res.videos.len());
                return Ok(res
                    .videos
                    .into_iter()
                    .map(|v| ClipCandidate {
                        id: v.id,
                        topic: topic.to_string(),
                    })
                    .collect());
            }
            debug!("Page {} returned no videos", page);
        }
        Ok(Vec::new())
    }

    async fn fetch(
        &self,
        candidate: &ClipCandidate,
        quality: Quality,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let url = format!("{}/videos/videos/{}", self.base_url, candidate.id);
        let metadata = |source: reqwest::Error| FetchError::Metadata {
            id: candidate.id,
            source,
        };
        let res = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(metadata)?;
        if !res.status().is_success() {
            return Err(FetchError::Api {
                id: candidate.id,
                status: res.status().as_u16(),
            });
        }
        let detail: VideoDetail = res.json().await.map_err(metadata)?;

        let link = detail
            .video_files
            .into_iter()
            .find(|f| f.width == Some(quality.width()))
            .map(|f| f.link)
            .ok_or(FetchError::NoMatchingQuality {
                id: candidate.id,
                quality: quality.name(),
            })?;

        let out_path = dest_dir.join(format!("{}.mp4", candidate.id));
        if let Err(e) = self.download(&link, &out_path).await {
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(e);
        }
        info!("Video id {} downloaded to {}", candidate.id, out_path.display());
        Ok(out_path)
    }
}
