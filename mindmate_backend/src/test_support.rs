//! Scripted model double shared by the workflow and server tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::llm_client::{LanguageModel, Message};
use crate::structured::OutputSchema;

pub enum Scripted {
    Value(Value),
    Absent,
    Fail(&'static str),
}

#[derive(Default)]
pub struct ScriptedModel {
    structured: Mutex<HashMap<&'static str, VecDeque<Scripted>>>,
    text: Mutex<VecDeque<Result<String, &'static str>>>,
    structured_calls: Mutex<Vec<(String, String)>>,
    free_form_calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a structured answer for the schema named `schema`.
    pub fn push_structured(&self, schema: &'static str, answer: Scripted) -> &Self {
        self.structured
            .lock()
            .unwrap()
            .entry(schema)
            .or_default()
            .push_back(answer);
        self
    }

    pub fn push_text(&self, reply: &str) -> &Self {
        self.text.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn push_text_error(&self, message: &'static str) -> &Self {
        self.text.lock().unwrap().push_back(Err(message));
        self
    }

    /// `(schema name, prompt)` for every structured call, in order.
    pub fn structured_calls(&self) -> Vec<(String, String)> {
        self.structured_calls.lock().unwrap().clone()
    }

    pub fn structured_calls_for(&self, schema: &str) -> Vec<String> {
        self.structured_calls()
            .into_iter()
            .filter(|(name, _)| name == schema)
            .map(|(_, prompt)| prompt)
            .collect()
    }

    pub fn free_form_calls(&self) -> Vec<Vec<Message>> {
        self.free_form_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, messages: Vec<Message>) -> Result<String> {
        self.free_form_calls.lock().unwrap().push(messages);
        match self.text.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<Option<Value>> {
        self.structured_calls
            .lock()
            .unwrap()
            .push((schema.name.to_string(), prompt.to_string()));
        let next = self
            .structured
            .lock()
            .unwrap()
            .get_mut(schema.name)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Scripted::Value(value)) => Ok(Some(value)),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            Some(Scripted::Absent) | None => Ok(None),
        }
    }
}
