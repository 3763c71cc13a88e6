// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The out-of-scope browser automation runtime, represented only as a
//! trait contract. The core depends on [`BrowserBackend`] and never on a
//! concrete browser engine — a real CDP/WebDriver implementor is a drop-in
//! replacement for [`MockBackend`], which is the only one shipped here.
//!
//! [`MockBackend`] is modeled on the teacher's `ScriptedMockProvider`:
//! a deterministic, pre-scripted response queue consumed one action at a
//! time, used for integration tests against the full dispatcher.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BrowserError;

/// Opaque handle to a launched browser process/context. The core never
/// inspects its contents — only the backend implementation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserHandle(pub u64);

#[derive(Debug, Clone)]
pub struct CursorInteractiveElement {
    pub text: String,
    pub selector: String,
    pub cursor_pointer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub tab_count: usize,
    pub tab_index: usize,
    pub raw_aria: String,
    pub cursor_interactive: Vec<CursorInteractiveElement>,
}

/// The capability contract the session core calls into. Every method that
/// suspends on browser I/O is `async` so the dispatcher can hold the
/// session mutex across the `.await` point without blocking other sessions.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(&self, profile_tier: u8) -> Result<BrowserHandle, BrowserError>;
    async fn close(&self, handle: BrowserHandle) -> Result<(), BrowserError>;

    async fn navigate(&self, handle: BrowserHandle, url: &str) -> Result<PageState, BrowserError>;
    async fn page_state(&self, handle: BrowserHandle) -> Result<PageState, BrowserError>;

    async fn click(&self, handle: BrowserHandle, selector: &str) -> Result<PageState, BrowserError>;
    async fn fill(&self, handle: BrowserHandle, selector: &str, value: &str) -> Result<PageState, BrowserError>;
    async fn type_text(&self, handle: BrowserHandle, selector: &str, text: &str) -> Result<PageState, BrowserError>;
    async fn press(&self, handle: BrowserHandle, key: &str) -> Result<PageState, BrowserError>;
    async fn select(&self, handle: BrowserHandle, selector: &str, value: &str) -> Result<PageState, BrowserError>;
    async fn scroll(&self, handle: BrowserHandle, dx: i64, dy: i64) -> Result<PageState, BrowserError>;
    async fn go_back(&self, handle: BrowserHandle) -> Result<PageState, BrowserError>;

    async fn screenshot(&self, handle: BrowserHandle) -> Result<Vec<u8>, BrowserError>;
    async fn evaluate(&self, handle: BrowserHandle, script: &str) -> Result<Value, BrowserError>;

    async fn cookies_get(&self, handle: BrowserHandle) -> Result<Value, BrowserError>;
    async fn cookies_set(&self, handle: BrowserHandle, cookies: &Value) -> Result<(), BrowserError>;

    async fn tab_new(&self, handle: BrowserHandle, url: Option<&str>) -> Result<PageState, BrowserError>;
    async fn tab_switch(&self, handle: BrowserHandle, index: usize) -> Result<PageState, BrowserError>;
    async fn tab_close(&self, handle: BrowserHandle, index: usize) -> Result<PageState, BrowserError>;

    async fn upload_file(&self, handle: BrowserHandle, selector: &str, path: &str) -> Result<PageState, BrowserError>;
    async fn get_downloads(&self, handle: BrowserHandle) -> Result<Value, BrowserError>;

    async fn find_elements(&self, handle: BrowserHandle, query: &str) -> Result<Value, BrowserError>;
    async fn search_page(&self, handle: BrowserHandle, query: &str) -> Result<Value, BrowserError>;

    async fn webmcp_discover(&self, handle: BrowserHandle) -> Result<Value, BrowserError>;
    async fn webmcp_call(&self, handle: BrowserHandle, tool: &str, args: &Value) -> Result<Value, BrowserError>;
}

/// One scripted response in a [`MockBackend`] queue.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Page(PageState),
    Value(Value),
    Bytes(Vec<u8>),
    Unit,
    Error(BrowserError),
}

/// Deterministic backend driven by a pre-scripted response queue, one
/// response consumed per call. Falls back to a minimal default page state
/// once the queue is exhausted rather than panicking, so long-running
/// integration tests don't need to script every call.
pub struct MockBackend {
    queue: Mutex<VecDeque<ScriptedResponse>>,
    next_handle: Mutex<u64>,
}

impl MockBackend {
    pub fn new(scripts: Vec<ScriptedResponse>) -> Self {
        Self {
            queue: Mutex::new(scripts.into_iter().collect()),
            next_handle: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn pop(&self) -> ScriptedResponse {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedResponse::Page(PageState {
                url: "about:blank".to_string(),
                title: String::new(),
                tab_count: 1,
                tab_index: 1,
                raw_aria: String::new(),
                cursor_interactive: Vec::new(),
            }))
    }

    fn pop_page(&self) -> Result<PageState, BrowserError> {
        match self.pop() {
            ScriptedResponse::Page(p) => Ok(p),
            ScriptedResponse::Error(e) => Err(e),
            _ => Ok(PageState::default()),
        }
    }

    fn pop_value(&self) -> Result<Value, BrowserError> {
        match self.pop() {
            ScriptedResponse::Value(v) => Ok(v),
            ScriptedResponse::Error(e) => Err(e),
            _ => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    async fn launch(&self, _profile_tier: u8) -> Result<BrowserHandle, BrowserError> {
        let mut n = self.next_handle.lock().unwrap();
        *n += 1;
        Ok(BrowserHandle(*n))
    }

    async fn close(&self, _handle: BrowserHandle) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn navigate(&self, _handle: BrowserHandle, _url: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn page_state(&self, _handle: BrowserHandle) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn click(&self, _handle: BrowserHandle, _selector: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn fill(&self, _handle: BrowserHandle, _selector: &str, _value: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn type_text(&self, _handle: BrowserHandle, _selector: &str, _text: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn press(&self, _handle: BrowserHandle, _key: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn select(&self, _handle: BrowserHandle, _selector: &str, _value: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn scroll(&self, _handle: BrowserHandle, _dx: i64, _dy: i64) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn go_back(&self, _handle: BrowserHandle) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn screenshot(&self, _handle: BrowserHandle) -> Result<Vec<u8>, BrowserError> {
        match self.pop() {
            ScriptedResponse::Bytes(b) => Ok(b),
            ScriptedResponse::Error(e) => Err(e),
            _ => Ok(Vec::new()),
        }
    }

    async fn evaluate(&self, _handle: BrowserHandle, _script: &str) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn cookies_get(&self, _handle: BrowserHandle) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn cookies_set(&self, _handle: BrowserHandle, _cookies: &Value) -> Result<(), BrowserError> {
        match self.pop() {
            ScriptedResponse::Error(e) => Err(e),
            _ => Ok(()),
        }
    }

    async fn tab_new(&self, _handle: BrowserHandle, _url: Option<&str>) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn tab_switch(&self, _handle: BrowserHandle, _index: usize) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn tab_close(&self, _handle: BrowserHandle, _index: usize) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn upload_file(&self, _handle: BrowserHandle, _selector: &str, _path: &str) -> Result<PageState, BrowserError> {
        self.pop_page()
    }

    async fn get_downloads(&self, _handle: BrowserHandle) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn find_elements(&self, _handle: BrowserHandle, _query: &str) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn search_page(&self, _handle: BrowserHandle, _query: &str) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn webmcp_discover(&self, _handle: BrowserHandle) -> Result<Value, BrowserError> {
        self.pop_value()
    }

    async fn webmcp_call(&self, _handle: BrowserHandle, _tool: &str, _args: &Value) -> Result<Value, BrowserError> {
        self.pop_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_backend_pops_scripted_pages_in_order() {
        let backend = MockBackend::new(vec![
            ScriptedResponse::Page(PageState { url: "https://a.test".to_string(), ..Default::default() }),
            ScriptedResponse::Page(PageState { url: "https://b.test".to_string(), ..Default::default() }),
        ]);
        let handle = backend.launch(1).await.unwrap();
        let p1 = backend.navigate(handle, "https://a.test").await.unwrap();
        let p2 = backend.navigate(handle, "https://b.test").await.unwrap();
        assert_eq!(p1.url, "https://a.test");
        assert_eq!(p2.url, "https://b.test");
    }

    #[tokio::test]
    async fn mock_backend_falls_back_to_default_when_exhausted() {
        let backend = MockBackend::empty();
        let handle = backend.launch(1).await.unwrap();
        let p = backend.navigate(handle, "https://a.test").await.unwrap();
        assert_eq!(p.url, "about:blank");
    }

    #[tokio::test]
    async fn mock_backend_surfaces_scripted_errors() {
        let backend = MockBackend::new(vec![ScriptedResponse::Error(crate::error::create_error(
            crate::error::ErrorCode::TimeoutAction,
            "timed out",
            None,
        ))]);
        let handle = backend.launch(1).await.unwrap();
        let err = backend.click(handle, "#go").await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TimeoutAction);
    }

    #[tokio::test]
    async fn launch_assigns_distinct_handles() {
        let backend = MockBackend::empty();
        let h1 = backend.launch(1).await.unwrap();
        let h2 = backend.launch(1).await.unwrap();
        assert_ne!(h1, h2);
    }
}
