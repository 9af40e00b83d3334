//! Turns a command's intent and parameters into an execution plan.
//!
//! Planning runs at submission so malformed commands are refused before any
//! ledger state exists.

use serde_json::{Map, Value};

use citydesk_core::{types::Intent, Error, Result};

/// Which providers an LLM call goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Exactly this provider, no fallback.
    Provider(String),
    /// This provider first, then every other one by priority.
    Preferred(String),
    /// Fallback chain over these providers; empty means all by priority.
    Fallback(Vec<String>),
}

/// Validated work for one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Llm {
        prompt: String,
        context: Option<String>,
        route: Route,
    },
    Rag {
        query: String,
        /// Passages to retrieve; router default when absent.
        k: Option<usize>,
        providers: Vec<String>,
    },
    CrossValidate {
        prompt: String,
        context: Option<String>,
        providers: Vec<String>,
    },
}

fn object<'a>(intent: Intent, parameters: &'a Value) -> Result<&'a Map<String, Value>> {
    parameters
        .as_object()
        .ok_or_else(|| Error::invalid_intent(format!("{} parameters must be a JSON object", intent)))
}

fn required_text(intent: Intent, params: &Map<String, Value>, key: &str) -> Result<String> {
    match params.get(key).and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(Error::invalid_intent(format!(
            "{} requires a non-empty '{}' string",
            intent, key
        ))),
    }
}

fn optional_text(intent: Intent, params: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(Error::invalid_intent(format!("{} '{}' must be a string", intent, key))),
    }
}

fn optional_flag(intent: Intent, params: &Map<String, Value>, key: &str) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(Error::invalid_intent(format!("{} '{}' must be a boolean", intent, key))),
    }
}

fn provider_list(intent: Intent, params: &Map<String, Value>) -> Result<Vec<String>> {
    match params.get("providers") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::invalid_intent(format!("{} 'providers' must hold provider ids", intent))
                    })
            })
            .collect(),
        Some(_) => Err(Error::invalid_intent(format!(
            "{} 'providers' must be an array",
            intent
        ))),
    }
}

/// Validate `parameters` for `intent`.
pub fn plan(intent: Intent, parameters: &Value) -> Result<Plan> {
    let params = object(intent, parameters)?;

    match intent {
        Intent::LlmQuery => {
            let prompt = required_text(intent, params, "prompt")?;
            let context = optional_text(intent, params, "context")?;
            let route = match optional_text(intent, params, "provider")? {
                Some(provider) => {
                    if params.contains_key("providers") {
                        return Err(Error::invalid_intent(
                            "llm_query takes either 'provider' or 'providers', not both",
                        ));
                    }
                    if optional_flag(intent, params, "fallback")? {
                        Route::Preferred(provider)
                    } else {
                        Route::Provider(provider)
                    }
                }
                None => Route::Fallback(provider_list(intent, params)?),
            };
            Ok(Plan::Llm {
                prompt,
                context,
                route,
            })
        }
        Intent::RagQuery => {
            let query = required_text(intent, params, "query")?;
            let k = match params.get("k").or_else(|| params.get("n_results")) {
                None | Some(Value::Null) => None,
                Some(v) => match v.as_u64() {
                    Some(k) if k > 0 => Some(k as usize),
                    _ => {
                        return Err(Error::invalid_intent(
                            "rag_query 'k' must be a positive integer",
                        ))
                    }
                },
            };
            Ok(Plan::Rag {
                query,
                k,
                providers: provider_list(intent, params)?,
            })
        }
        Intent::CrossValidate => Ok(Plan::CrossValidate {
            prompt: required_text(intent, params, "prompt")?,
            context: optional_text(intent, params, "context")?,
            providers: provider_list(intent, params)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_llm_query_routes() {
        let single = plan(Intent::LlmQuery, &json!({"prompt": "hours?", "provider": "openai"})).unwrap();
        assert_eq!(
            single,
            Plan::Llm {
                prompt: "hours?".into(),
                context: None,
                route: Route::Provider("openai".into()),
            }
        );

        let chain = plan(
            Intent::LlmQuery,
            &json!({"prompt": "hours?", "context": "City hall", "providers": ["gemini", "openai"]}),
        )
        .unwrap();
        match chain {
            Plan::Llm { route, context, .. } => {
                assert_eq!(route, Route::Fallback(vec!["gemini".into(), "openai".into()]));
                assert_eq!(context.as_deref(), Some("City hall"));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_llm_query_preferred_provider_with_fallback() {
        let p = plan(
            Intent::LlmQuery,
            &json!({"prompt": "hours?", "provider": "gemini", "fallback": true}),
        )
        .unwrap();
        match p {
            Plan::Llm { route, .. } => assert_eq!(route, Route::Preferred("gemini".into())),
            other => panic!("unexpected plan {:?}", other),
        }

        let p = plan(
            Intent::LlmQuery,
            &json!({"prompt": "hours?", "provider": "gemini", "fallback": false}),
        )
        .unwrap();
        match p {
            Plan::Llm { route, .. } => assert_eq!(route, Route::Provider("gemini".into())),
            other => panic!("unexpected plan {:?}", other),
        }

        let err = plan(
            Intent::LlmQuery,
            &json!({"prompt": "hours?", "provider": "gemini", "fallback": "yes"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_INTENT");
    }

    #[test]
    fn test_missing_prompt_is_invalid_intent() {
        for params in [json!({}), json!({"prompt": "   "}), json!({"prompt": 7}), json!("text")] {
            let err = plan(Intent::LlmQuery, &params).unwrap_err();
            assert!(matches!(err, Error::InvalidIntent(_)), "{:?}", params);
        }
    }

    #[test]
    fn test_rag_query_accepts_n_results() {
        let p = plan(Intent::RagQuery, &json!({"query": "snow", "n_results": 3})).unwrap();
        assert_eq!(
            p,
            Plan::Rag {
                query: "snow".into(),
                k: Some(3),
                providers: vec![],
            }
        );
        assert!(plan(Intent::RagQuery, &json!({"query": "snow", "k": 0})).is_err());
    }

    #[test]
    fn test_cross_validate_rejects_bad_provider_list() {
        let err = plan(Intent::CrossValidate, &json!({"prompt": "p", "providers": "openai"})).unwrap_err();
        assert_eq!(err.code(), "INVALID_INTENT");
        let err = plan(Intent::CrossValidate, &json!({"prompt": "p", "providers": [1]})).unwrap_err();
        assert_eq!(err.code(), "INVALID_INTENT");
    }
}
