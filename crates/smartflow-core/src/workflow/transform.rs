//! Transform functions for non-LLM substeps.
//!
//! A transform maps the merged substep input (a JSON object) to an output
//! payload. Sync closures and async closures are both supported through
//! [`sync_transform`] and [`async_transform`]. Workflow definitions refer to
//! transforms by name through a [`TransformRegistry`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value, json};
use smartflow_types::error::TransformError;

use super::template::value_as_text;

/// Boxed future returned by [`Transform::call`].
pub type TransformFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, TransformError>> + Send + 'a>>;

/// A plain data-transform function `(input: JSON) -> JSON`.
///
/// Object-safe so transforms can be stored as `Arc<dyn Transform>` and shared
/// between substeps.
pub trait Transform: Send + Sync {
    fn call<'a>(&'a self, input: &'a Value) -> TransformFuture<'a>;
}

struct SyncTransform<F>(F);

impl<F> Transform for SyncTransform<F>
where
    F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync,
{
    fn call<'a>(&'a self, input: &'a Value) -> TransformFuture<'a> {
        let result = (self.0)(input);
        Box::pin(async move { result })
    }
}

struct AsyncTransform<F>(F);

impl<F, Fut> Transform for AsyncTransform<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TransformError>> + Send + 'static,
{
    fn call<'a>(&'a self, input: &'a Value) -> TransformFuture<'a> {
        Box::pin((self.0)(input.clone()))
    }
}

/// Wrap a synchronous function as a shared transform.
pub fn sync_transform<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(&Value) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    Arc::new(SyncTransform(f))
}

/// Wrap an async function as a shared transform. The input is passed by value.
pub fn async_transform<F, Fut>(f: F) -> Arc<dyn Transform>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransformError>> + Send + 'static,
{
    Arc::new(AsyncTransform(f))
}

// ---------------------------------------------------------------------------
// TransformRegistry
// ---------------------------------------------------------------------------

/// Named transforms available to workflow definitions.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("uppercase", sync_transform(uppercase));
        registry.register("processed", sync_transform(processed));
        registry.register("data_processor", sync_transform(data_processor));
        registry.register("validation", sync_transform(validation));
        registry.register("web_search", sync_transform(web_search));
        registry
    }

    /// Register (or replace) a transform under `name`.
    pub fn register(&mut self, name: impl Into<String>, transform: Arc<dyn Transform>) {
        self.transforms.insert(name.into(), transform);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Transform>, TransformError> {
        self.transforms
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transforms.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

/// The `input_data` field as text; empty when absent.
fn input_text(input: &Value) -> String {
    input.get("input_data").map(value_as_text).unwrap_or_default()
}

/// `{"result": upper(input_data)}`.
pub fn uppercase(input: &Value) -> Result<Value, TransformError> {
    Ok(json!({"result": input_text(input).to_uppercase()}))
}

/// `{"result": "Processed: <UPPER>"}`.
pub fn processed(input: &Value) -> Result<Value, TransformError> {
    Ok(json!({"result": format!("Processed: {}", input_text(input).to_uppercase())}))
}

/// Normalized text plus word and character counts.
pub fn data_processor(input: &Value) -> Result<Value, TransformError> {
    let text = input_text(input).trim().to_lowercase();
    let word_count = text.split_whitespace().count();
    let char_count = text.chars().count();
    Ok(json!({
        "result": {
            "processed_text": text,
            "word_count": word_count,
            "char_count": char_count,
            "summary": format!("Processed {word_count} words and {char_count} characters"),
        }
    }))
}

/// Emptiness check on `input_data`.
pub fn validation(input: &Value) -> Result<Value, TransformError> {
    let raw = input_text(input);
    let mut errors = Vec::new();
    if raw.is_empty() {
        errors.push("Input data is empty");
    } else if raw.trim().is_empty() {
        errors.push("Input data contains only whitespace");
    }
    let is_valid = errors.is_empty();
    Ok(json!({
        "result": {
            "is_valid": is_valid,
            "errors": errors,
            "message": if is_valid { "Validation passed" } else { "Validation failed" },
        }
    }))
}

/// Placeholder search result for the query in `input_data`.
pub fn web_search(input: &Value) -> Result<Value, TransformError> {
    Ok(json!({"result": format!("Web search results for {}", input_text(input))}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_uppercase() {
        let registry = TransformRegistry::with_builtins();
        let transform = registry.get("uppercase").unwrap();
        let output = transform.call(&json!({"input_data": "hello"})).await.unwrap();
        assert_eq!(output, json!({"result": "HELLO"}));
    }

    #[test]
    fn test_processed() {
        let output = processed(&json!({"input_data": "hello"})).unwrap();
        assert_eq!(output, json!({"result": "Processed: HELLO"}));
    }

    #[test]
    fn test_data_processor_counts() {
        let output = data_processor(&json!({"input_data": "  Hello Big World "})).unwrap();
        assert_eq!(output["result"]["processed_text"], "hello big world");
        assert_eq!(output["result"]["word_count"], 3);
        assert_eq!(output["result"]["char_count"], 15);
        assert_eq!(
            output["result"]["summary"],
            "Processed 3 words and 15 characters"
        );
    }

    #[test]
    fn test_validation() {
        let ok = validation(&json!({"input_data": "text"})).unwrap();
        assert_eq!(ok["result"]["is_valid"], true);
        assert_eq!(ok["result"]["message"], "Validation passed");

        let empty = validation(&json!({})).unwrap();
        assert_eq!(empty["result"]["is_valid"], false);
        assert_eq!(empty["result"]["errors"][0], "Input data is empty");

        let blank = validation(&json!({"input_data": "   "})).unwrap();
        assert_eq!(blank["result"]["errors"][0], "Input data contains only whitespace");
    }

    #[test]
    fn test_web_search() {
        let output = web_search(&json!({"input_data": "rust"})).unwrap();
        assert_eq!(output["result"], "Web search results for rust");
    }

    #[test]
    fn test_unknown_transform() {
        let registry = TransformRegistry::with_builtins();
        assert!(matches!(
            registry.get("reverse"),
            Err(TransformError::Unknown(name)) if name == "reverse"
        ));
        assert!(registry.contains("validation"));
        assert_eq!(registry.names().len(), 5);
    }

    #[tokio::test]
    async fn test_async_transform() {
        let transform = async_transform(|input: Value| async move {
            tokio::task::yield_now().await;
            let n = input["n"]
                .as_i64()
                .ok_or_else(|| TransformError::InvalidInput("n must be an integer".into()))?;
            Ok::<_, TransformError>(json!({"result": n * 2}))
        });
        assert_eq!(
            transform.call(&json!({"n": 21})).await.unwrap(),
            json!({"result": 42})
        );
        assert!(transform.call(&json!({"n": "x"})).await.is_err());
    }

    #[tokio::test]
    async fn test_custom_registration_replaces() {
        let mut registry = TransformRegistry::with_builtins();
        registry.register(
            "uppercase",
            sync_transform(|_| Ok(json!({"result": "custom"}))),
        );
        let output = registry
            .get("uppercase")
            .unwrap()
            .call(&json!({}))
            .await
            .unwrap();
        assert_eq!(output["result"], "custom");
    }
}
