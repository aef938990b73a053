//! Solving service client
//!
//! Talks to the remote recognition API: one POST per variant, the license
//! key as a query parameter, camelCase JSON both ways. Answers come back
//! as typed [`Solution`]s; click points arrive as proportions of the
//! submitted crop and stay normalized until actuation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::challenge::{Evidence, Solution};
use crate::config::SolverConfig;
use crate::error::{ClientError, ConfigError, Result};
use crate::geometry::Point;

/// Seam the orchestrator solves through. Lets tests stand in for the
/// remote service.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Submit evidence and get the typed answer for its variant
    async fn solve(&self, evidence: &Evidence) -> Result<Solution>;
}

/// HTTP client for the recognition service
pub struct SolverClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl SolverClient {
    /// Build a client from a validated config
    pub fn new(config: &SolverConfig) -> Result<Self> {
        let mut base = Url::parse(&config.api_base_url).map_err(|e| ConfigError::InvalidUrl {
            field: "api_base_url",
            message: e.to_string(),
        })?;
        // Endpoints are joined relative to the base, so the path has to
        // end in a slash or a configured prefix would be dropped.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.attempt_timeout())
            .default_headers(headers);

        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| ConfigError::InvalidUrl {
                field: "proxy",
                message: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base,
            api_key: config.api_key.clone(),
        })
    }

    async fn post_json<B, R>(&self, path: &'static str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("licenseKey", &self.api_key);

        debug!(endpoint = path, "submitting evidence");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::AuthRejected {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Service {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        resp.json::<R>()
            .await
            .map_err(|e| ClientError::Schema(e.to_string()).into())
    }
}

#[async_trait]
impl ChallengeSolver for SolverClient {
    async fn solve(&self, evidence: &Evidence) -> Result<Solution> {
        match evidence {
            Evidence::Rotate {
                outer_b64,
                inner_b64,
            } => {
                let resp: RotateResponse = self
                    .post_json(
                        "rotate",
                        &RotateRequest {
                            outer_image_b64: outer_b64,
                            inner_image_b64: inner_b64,
                        },
                    )
                    .await?;
                debug!(angle = resp.angle, "service answered rotate");
                Ok(Solution::Rotate { angle: resp.angle })
            }
            Evidence::SlidePuzzle {
                puzzle_b64,
                piece_b64,
            } => {
                let resp: PuzzleResponse = self
                    .post_json(
                        "puzzle",
                        &PuzzleRequest {
                            puzzle_image_b64: puzzle_b64,
                            piece_image_b64: piece_b64,
                        },
                    )
                    .await?;
                debug!(proportion = resp.slide_x_proportion, "service answered puzzle");
                Ok(Solution::SlidePuzzle {
                    slide_proportion: resp.slide_x_proportion,
                })
            }
            Evidence::ShapeClick { shapes_b64 } => {
                let resp: ShapesResponse = self
                    .post_json(
                        "shapes",
                        &ShapesRequest {
                            shapes_image_b64: shapes_b64,
                        },
                    )
                    .await?;
                debug!("service answered shapes");
                Ok(shapes_solution(resp))
            }
            Evidence::IconSelect {
                challenge_text,
                icon_b64,
            } => {
                let resp: IconResponse = self
                    .post_json(
                        "icon",
                        &IconRequest {
                            challenge_text,
                            icon_image_b64: icon_b64,
                        },
                    )
                    .await?;
                debug!(points = resp.proportional_points.len(), "service answered icon");
                icon_solution(resp)
            }
        }
    }
}

fn shapes_solution(resp: ShapesResponse) -> Solution {
    Solution::ShapeClick {
        points: vec![
            Point::new(resp.point_one_proportion_x, resp.point_one_proportion_y),
            Point::new(resp.point_two_proportion_x, resp.point_two_proportion_y),
        ],
    }
}

fn icon_solution(resp: IconResponse) -> Result<Solution> {
    if resp.proportional_points.is_empty() {
        return Err(ClientError::Schema("icon response carried no points".to_string()).into());
    }
    Ok(Solution::IconSelect {
        points: resp
            .proportional_points
            .iter()
            .map(|p| Point::new(p.proportion_x, p.proportion_y))
            .collect(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RotateRequest<'a> {
    outer_image_b64: &'a str,
    inner_image_b64: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RotateResponse {
    angle: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PuzzleRequest<'a> {
    puzzle_image_b64: &'a str,
    piece_image_b64: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PuzzleResponse {
    slide_x_proportion: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShapesRequest<'a> {
    shapes_image_b64: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapesResponse {
    point_one_proportion_x: f64,
    point_one_proportion_y: f64,
    point_two_proportion_x: f64,
    point_two_proportion_y: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IconRequest<'a> {
    challenge_text: &'a str,
    icon_image_b64: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IconResponse {
    proportional_points: Vec<ProportionalPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProportionalPoint {
    proportion_x: f64,
    proportion_y: f64,
}
