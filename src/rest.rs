//! Blocking client for the PostgREST endpoints that hold textbooks and their pages.
//!
//! Every request goes through [`RetryPolicy`]; transport errors, timeouts,
//! non-2xx statuses and undecodable bodies all count as retryable failures.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::StoreConfig;
use crate::model::{IdRow, NewTextbook, PageRow};
use crate::retry::{RetryExhausted, RetryPolicy};

pub const TEXTBOOKS_TABLE: &str = "textbooks";
pub const PAGES_TABLE: &str = "textbook_pages";

pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[error("{method} {url} returned an undecodable body: {source}")]
    Decode {
        method: &'static str,
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Exhausted(#[from] RetryExhausted<RemoteError>),
    #[error("insert into {table} returned no rows")]
    NoRowsReturned { table: &'static str },
}

/// Remote operations the indexing pipeline needs.
pub trait TextbookStore {
    fn find_textbook(
        &self,
        grade: u32,
        subject: &str,
        file_url: &str,
    ) -> Result<Option<i64>, StoreError>;

    fn insert_textbook(&self, textbook: &NewTextbook) -> Result<i64, StoreError>;

    fn delete_pages(&self, textbook_id: i64) -> Result<(), StoreError>;

    fn insert_pages(&self, pages: &[PageRow]) -> Result<(), StoreError>;
}

pub struct RestStore {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(&config.service_key)
            .context("service role key is not a valid header value")?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .context("service role key is not a valid header value")?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", api_key);
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.rest_base(),
            retry: RetryPolicy::default(),
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    pub fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, RetryExhausted<RemoteError>> {
        let url = self.table_url(table);
        self.retry.run(&format!("select {table}"), || {
            let request = self.client.get(&url).query(params).timeout(self.read_timeout);
            let body = send("GET", &url, request)?;
            decode("GET", &url, &body)
        })
    }

    pub fn insert<B, T>(&self, table: &str, rows: &B) -> Result<Vec<T>, RetryExhausted<RemoteError>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.table_url(table);
        self.retry.run(&format!("insert {table}"), || {
            let request = self.client.post(&url).json(rows).timeout(self.write_timeout);
            let body = send("POST", &url, request)?;
            decode("POST", &url, &body)
        })
    }

    pub fn delete(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<String, RetryExhausted<RemoteError>> {
        let url = self.table_url(table);
        self.retry.run(&format!("delete {table}"), || {
            let request = self
                .client
                .delete(&url)
                .query(params)
                .timeout(self.write_timeout);
            send("DELETE", &url, request)
        })
    }
}

impl TextbookStore for RestStore {
    fn find_textbook(
        &self,
        grade: u32,
        subject: &str,
        file_url: &str,
    ) -> Result<Option<i64>, StoreError> {
        let rows: Vec<IdRow> = self.select(
            TEXTBOOKS_TABLE,
            &[
                ("select", "id".to_string()),
                ("grade", format!("eq.{grade}")),
                ("subject", format!("eq.{subject}")),
                ("file_url", format!("eq.{file_url}")),
                ("limit", "1".to_string()),
            ],
        )?;
        Ok(rows.first().map(|row| row.id))
    }

    fn insert_textbook(&self, textbook: &NewTextbook) -> Result<i64, StoreError> {
        let rows: Vec<IdRow> = self.insert(TEXTBOOKS_TABLE, std::slice::from_ref(textbook))?;
        rows.first()
            .map(|row| row.id)
            .ok_or(StoreError::NoRowsReturned {
                table: TEXTBOOKS_TABLE,
            })
    }

    fn delete_pages(&self, textbook_id: i64) -> Result<(), StoreError> {
        self.delete(PAGES_TABLE, &[("textbook_id", format!("eq.{textbook_id}"))])?;
        Ok(())
    }

    fn insert_pages(&self, pages: &[PageRow]) -> Result<(), StoreError> {
        let _: Vec<serde_json::Value> = self.insert(PAGES_TABLE, pages)?;
        Ok(())
    }
}

fn send(method: &'static str, url: &str, request: RequestBuilder) -> Result<String, RemoteError> {
    let response = request.send().map_err(|source| RemoteError::Transport {
        method,
        url: url.to_string(),
        source,
    })?;
    let response = ensure_success(method, url, response)?;
    let body = response.text().map_err(|source| RemoteError::Transport {
        method,
        url: url.to_string(),
        source,
    })?;
    debug!(method, url, bytes = body.len(), "remote call succeeded");
    Ok(body)
}

fn ensure_success(
    method: &'static str,
    url: &str,
    response: Response,
) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(RemoteError::Status {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

fn decode<T: DeserializeOwned>(
    method: &'static str,
    url: &str,
    body: &str,
) -> Result<Vec<T>, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|source| RemoteError::Decode {
        method,
        url: url.to_string(),
        source,
    })
}
