use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, RequestMode, Response};

use super::error::ServiceError;
use super::params::SimulationParameters;
use super::service::{RunReport, SimulationService, StepReport};
use crate::graph::Snapshot;

/// JSON-over-HTTP client for the simulation backend, using the browser's `fetch`.
#[derive(Clone, Debug)]
pub struct HttpSimulationService {
	base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
	data: &'a Snapshot,
	params: &'a SimulationParameters,
	#[serde(skip_serializing_if = "Option::is_none")]
	current_day: Option<u32>,
}

impl HttpSimulationService {
	/// Client for the service at `base_url`.
	pub fn new(base_url: &str) -> Self {
		Self {
			base_url: base_url.trim_end_matches('/').to_string(),
		}
	}

	/// Service root, without trailing slash.
	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
		let text = self.send("GET", path, None).await?;
		decode(&text)
	}

	async fn post<B: Serialize, T: DeserializeOwned>(
		&self,
		path: &str,
		body: &B,
	) -> Result<T, ServiceError> {
		let body = serde_json::to_string(body).map_err(|e| ServiceError::Decode(e.to_string()))?;
		let text = self.send("POST", path, Some(body)).await?;
		decode(&text)
	}

	async fn send(
		&self,
		method: &str,
		path: &str,
		body: Option<String>,
	) -> Result<String, ServiceError> {
		let url = format!("{}{}", self.base_url, path);
		debug!("{method} {url}");

		let opts = RequestInit::new();
		opts.set_method(method);
		opts.set_mode(RequestMode::Cors);
		if let Some(body) = body {
			let headers = Headers::new().map_err(transport)?;
			headers
				.set("Content-Type", "application/json")
				.map_err(transport)?;
			opts.set_headers(&headers);
			opts.set_body(&JsValue::from_str(&body));
		}

		let request = Request::new_with_str_and_init(&url, &opts).map_err(transport)?;
		let window =
			web_sys::window().ok_or_else(|| ServiceError::Transport("no window".into()))?;
		let response: Response = JsFuture::from(window.fetch_with_request(&request))
			.await
			.map_err(transport)?
			.dyn_into()
			.map_err(|_| ServiceError::Transport("fetch did not yield a Response".into()))?;

		let text = JsFuture::from(response.text().map_err(transport)?)
			.await
			.map_err(transport)?
			.as_string()
			.unwrap_or_default();

		match response.status() {
			200..=299 => Ok(text),
			400 | 422 => Err(ServiceError::Rejected(rejection_reason(&text))),
			status => Err(ServiceError::Status(status)),
		}
	}
}

fn transport(err: JsValue) -> ServiceError {
	ServiceError::Transport(format!("{err:?}"))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ServiceError> {
	serde_json::from_str(text).map_err(|e| ServiceError::Decode(e.to_string()))
}

/// Pull an `error` or `message` field out of a JSON error body, else use the raw text.
fn rejection_reason(body: &str) -> String {
	serde_json::from_str::<serde_json::Value>(body)
		.ok()
		.and_then(|v| {
			["error", "message"]
				.iter()
				.find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_owned))
		})
		.unwrap_or_else(|| body.trim().to_string())
}

#[async_trait(?Send)]
impl SimulationService for HttpSimulationService {
	async fn fetch_default_network(&self) -> Result<Snapshot, ServiceError> {
		self.get("/api/graph/default").await
	}

	async fn fetch_random_network(&self) -> Result<Snapshot, ServiceError> {
		self.get("/api/graph/random").await
	}

	async fn upload_network(&self, graph: &Snapshot) -> Result<Snapshot, ServiceError> {
		self.post("/api/graph/upload", graph).await
	}

	async fn init(
		&self,
		baseline: &Snapshot,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError> {
		let body = RunRequest {
			data: baseline,
			params,
			current_day: None,
		};
		self.post("/api/simulation/init", &body).await
	}

	async fn start(
		&self,
		from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<RunReport, ServiceError> {
		let body = RunRequest {
			data: from,
			params,
			current_day: Some(current_day),
		};
		self.post("/api/simulation/start", &body).await
	}

	async fn poll(&self) -> Result<RunReport, ServiceError> {
		self.get("/api/simulation/state").await
	}

	async fn step(
		&self,
		from: &Snapshot,
		current_day: u32,
		params: &SimulationParameters,
	) -> Result<StepReport, ServiceError> {
		let body = RunRequest {
			data: from,
			params,
			current_day: Some(current_day),
		};
		self.post("/api/simulation/step", &body).await
	}

	async fn pause(&self) -> Result<(), ServiceError> {
		self.send("POST", "/api/simulation/pause", Some("{}".into()))
			.await
			.map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejection_reason_prefers_error_field() {
		assert_eq!(rejection_reason(r#"{"error": "missing links"}"#), "missing links");
		assert_eq!(rejection_reason(r#"{"message": "bad id"}"#), "bad id");
		assert_eq!(rejection_reason(" plain text \n"), "plain text");
	}

	#[test]
	fn run_request_body_shape() {
		let snapshot = Snapshot::default();
		let params = SimulationParameters::default();
		let body = RunRequest {
			data: &snapshot,
			params: &params,
			current_day: Some(3),
		};
		let json = serde_json::to_value(&body).unwrap();
		assert_eq!(json["currentDay"], 3);
		assert_eq!(json["params"]["S2E"], 0.4);
		assert!(json["data"]["links"].is_array());
	}

	#[test]
	fn trailing_slash_is_trimmed() {
		let service = HttpSimulationService::new("http://127.0.0.1:5000/");
		assert_eq!(service.base_url(), "http://127.0.0.1:5000");
	}
}
