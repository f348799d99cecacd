//! Output targets for display payloads

use std::io::Write;

use anyhow::Context;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Receives finished payloads.
///
/// `is_update` is set when the payload replaces the content of a slot that
/// was rendered before, as opposed to opening a new one.
pub trait RenderTarget: Send + Sync {
    fn render(
        &self,
        payload: &Value,
        metadata: &Value,
        display_slot: &str,
        is_update: bool,
    ) -> anyhow::Result<()>;
}

/// One call to [`RenderTarget::render`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub payload: Value,
    pub metadata: Value,
    pub display_slot: String,
    pub is_update: bool,
}

/// Keeps every rendered payload in memory
#[derive(Default)]
pub struct MemoryRenderer {
    outputs: Mutex<Vec<RenderedOutput>>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<RenderedOutput> {
        self.outputs.lock().clone()
    }

    pub fn last(&self) -> Option<RenderedOutput> {
        self.outputs.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RenderTarget for MemoryRenderer {
    fn render(
        &self,
        payload: &Value,
        metadata: &Value,
        display_slot: &str,
        is_update: bool,
    ) -> anyhow::Result<()> {
        self.outputs.lock().push(RenderedOutput {
            payload: payload.clone(),
            metadata: metadata.clone(),
            display_slot: display_slot.to_string(),
            is_update,
        });
        Ok(())
    }
}

/// Writes one JSON object per rendered payload
pub struct JsonLinesRenderer<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> RenderTarget for JsonLinesRenderer<W> {
    fn render(
        &self,
        payload: &Value,
        metadata: &Value,
        display_slot: &str,
        is_update: bool,
    ) -> anyhow::Result<()> {
        let message = json!({
            "display_id": display_slot,
            "update": is_update,
            "data": payload,
            "metadata": metadata,
        });

        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, &message).context("Failed to serialize payload")?;
        writer.write_all(b"\n").context("Failed to write payload")?;
        writer.flush().context("Failed to flush payload")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_renderer_records_calls() {
        let renderer = MemoryRenderer::new();
        renderer.render(&json!({"a": 1}), &json!({}), "slot", false).unwrap();
        renderer.render(&json!({"a": 2}), &json!({}), "slot", true).unwrap();

        assert_eq!(renderer.len(), 2);
        let last = renderer.last().unwrap();
        assert!(last.is_update);
        assert_eq!(last.payload["a"], 2);
    }

    #[test]
    fn test_json_lines() {
        let renderer = JsonLinesRenderer::new(Vec::new());
        renderer.render(&json!({"x": [1]}), &json!({"m": true}), "s1", false).unwrap();
        renderer.render(&json!({"x": [2]}), &json!({}), "s1", true).unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["display_id"], "s1");
        assert_eq!(lines[0]["update"], false);
        assert_eq!(lines[1]["data"]["x"][0], 2);
    }
}
