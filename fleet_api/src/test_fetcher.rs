//! Scripted in-memory transport for tests. Responses are keyed by the full
//! request URL, consumed in order, so tests can assert exactly which
//! requests a crawl or collection cycle issued.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use url::Url;

use crate::fetcher::JsonFetcher;

#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, String>>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, response: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    pub fn script_error(&self, url: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }
}

#[async_trait]
impl JsonFetcher for ScriptedFetcher {
    async fn fetch_json(&self, url: &Url) -> Result<serde_json::Value> {
        let key = url.as_str().to_string();
        self.requests.lock().unwrap().push(key.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Err(anyhow!("no scripted response for {}", key)),
        }
    }
}
