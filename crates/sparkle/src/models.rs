//! Wire models for the batch service and the YARN resource manager.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{JobState, LogAggregationStatus};

/// Parameters of a batch submission.
///
/// The engine treats these as opaque: they are serialized as-is into the
/// creation request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionParams {
    /// Remote URI of the job artifact.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jars: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub py_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_executors: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conf: BTreeMap<String, String>,
}

impl SubmissionParams {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default)]
    pub driver_log_url: Option<String>,
    #[serde(default)]
    pub spark_ui_url: Option<String>,
}

/// Body of `POST /batches` and `GET /batches/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub id: u64,
    pub state: JobState,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_info: Option<AppInfo>,
    #[serde(default)]
    pub log: Vec<String>,
}

impl BatchResponse {
    pub fn driver_log_url(&self) -> Option<&str> {
        self.app_info
            .as_ref()
            .and_then(|info| info.driver_log_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

/// Body of `GET /batches/{id}/log`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchLogResponse {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub log: Vec<String>,
}

/// Status of a serverless batch job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessBatchResponse {
    pub id: String,
    #[serde(default)]
    pub livy_id: Option<u64>,
    pub state: JobState,
    #[serde(default)]
    pub scheduler_state: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_info: Option<AppInfo>,
    #[serde(default)]
    pub log: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YarnAppEnvelope {
    pub app: YarnApp,
}

/// Application record of the YARN cluster REST API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YarnApp {
    pub id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub final_status: Option<String>,
    #[serde(default)]
    pub am_host_http_address: Option<String>,
    #[serde(default)]
    pub am_container_logs: Option<String>,
    #[serde(default)]
    pub log_aggregation_status: Option<LogAggregationStatus>,
    #[serde(default)]
    pub diagnostics: Option<String>,
}

impl YarnApp {
    /// Whether the resource manager considers the application over.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state.as_deref(),
            Some("FINISHED") | Some("FAILED") | Some("KILLED")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttemptsEnvelope {
    pub app_attempts: AppAttempts,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttempts {
    #[serde(default)]
    pub app_attempt: Vec<AppAttempt>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAttempt {
    pub id: u32,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub node_http_address: Option<String>,
    #[serde(default)]
    pub logs_link: Option<String>,
}

impl AppAttempts {
    /// The attempt with the highest id, which is the one currently running.
    pub fn latest(&self) -> Option<&AppAttempt> {
        self.app_attempt.iter().max_by_key(|attempt| attempt.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_status() {
        let body = r#"{
            "id": 42,
            "state": "starting",
            "appId": null,
            "appInfo": {"driverLogUrl": null, "sparkUiUrl": null},
            "log": ["stdout: ", "stderr: "]
        }"#;
        let batch: BatchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(batch.id, 42);
        assert_eq!(batch.state, JobState::Starting);
        assert_eq!(batch.app_id, None);
        assert_eq!(batch.driver_log_url(), None);
        assert_eq!(batch.log.len(), 2);
    }

    #[test]
    fn empty_driver_log_url_is_absent() {
        let body = r#"{"id": 1, "state": "running", "appInfo": {"driverLogUrl": ""}}"#;
        let batch: BatchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(batch.driver_log_url(), None);
    }

    #[test]
    fn submission_params_skip_empty_fields() {
        let params = SubmissionParams::new("wasbs://c@a.blob.core.windows.net/app.jar")
            .class_name("com.example.Main")
            .args(["--input", "/data"]);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["className"], "com.example.Main");
        assert_eq!(json["args"][1], "/data");
        assert!(json.get("jars").is_none());
        assert!(json.get("driverMemory").is_none());
    }

    #[test]
    fn latest_attempt_is_highest_id() {
        let body = r#"{"appAttempts": {"appAttempt": [
            {"id": 1, "logsLink": "http://a:8042/node/containerlogs/container_1_01/livy"},
            {"id": 2, "logsLink": "http://b:8042/node/containerlogs/container_1_02/livy"}
        ]}}"#;
        let attempts: AppAttemptsEnvelope = serde_json::from_str(body).unwrap();
        let latest = attempts.app_attempts.latest().unwrap();
        assert_eq!(latest.id, 2);
        assert!(latest.logs_link.as_deref().unwrap().contains("container_1_02"));
    }

    #[test]
    fn yarn_app_finished_flag() {
        let body = r#"{"app": {"id": "application_1_0001", "state": "FINISHED",
            "finalStatus": "SUCCEEDED", "logAggregationStatus": "SUCCEEDED"}}"#;
        let envelope: YarnAppEnvelope = serde_json::from_str(body).unwrap();
        assert!(envelope.app.is_finished());
        assert_eq!(
            envelope.app.log_aggregation_status,
            Some(LogAggregationStatus::Succeeded)
        );
    }
}
