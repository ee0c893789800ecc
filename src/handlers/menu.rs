use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};

use crate::models::{MenuSuggestion, ProductRecord};
use crate::services::VisionModel;

pub const MENU_ATTEMPTS: usize = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pick the (up to) three nearest-to-expiry products.
///
/// Expiration dates are compared as strings. For uniformly formatted ISO-8601
/// dates this matches chronological order; mixed formats are compared as-is.
pub fn select_expiring(products: &[ProductRecord]) -> Vec<&ProductRecord> {
    let mut sorted: Vec<&ProductRecord> = products.iter().collect();
    sorted.sort_by(|a, b| a.expiration_date.cmp(&b.expiration_date));
    sorted.truncate(3);
    sorted
}

pub fn build_menu_prompt(selected: &[&ProductRecord]) -> String {
    let mut prompt = String::from("以下の食材を使った料理を1つ提案してください：\n");
    for product in selected {
        prompt.push_str(&format!(
            "- {} ({} {})\n",
            product.name, product.amount, product.unit
        ));
    }
    prompt.push_str(
        "\n賞味期限が近い食材なので、すべて使い切れる料理が望ましいです。\n\
         JSONのキーは以下の通りです：\n\
         - title（料理名）\n\
         - ingredients（材料のリスト）\n\
         - indication（作り方の説明）",
    );
    prompt
}

fn menu_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "ingredients": { "type": "ARRAY", "items": { "type": "STRING" } },
            "indication": { "type": "STRING" }
        },
        "required": ["title", "ingredients", "indication"]
    })
}

pub struct MenuPlanner {
    model: Arc<dyn VisionModel>,
}

impl MenuPlanner {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self { model }
    }

    /// Ask for a dish using the soonest-expiring ingredients. The model call is
    /// retried up to [`MENU_ATTEMPTS`] times with a fixed 1 s pause; the last
    /// error is surfaced if every attempt fails.
    pub async fn suggest(&self, products: &[ProductRecord]) -> Result<MenuSuggestion> {
        let selected = select_expiring(products);
        let prompt = build_menu_prompt(&selected);
        let schema = menu_schema();

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=MENU_ATTEMPTS {
            match self.model.infer(&prompt, &schema, None).await {
                Ok(value) => match serde_json::from_value::<MenuSuggestion>(value) {
                    Ok(suggestion) => {
                        log::info!(
                            "🍳 Menu suggestion ready after {} attempt(s): {}",
                            attempt,
                            suggestion.title
                        );
                        return Ok(suggestion);
                    }
                    Err(e) => {
                        log::warn!("⚠️ Attempt {}/{}: unusable suggestion: {}", attempt, MENU_ATTEMPTS, e);
                        last_error = Some(e.into());
                    }
                },
                Err(e) => {
                    log::warn!("⚠️ Attempt {}/{} failed: {}", attempt, MENU_ATTEMPTS, e);
                    last_error = Some(e.into());
                }
            }

            if attempt < MENU_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("menu suggestion failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::{Category, Unit};
    use crate::services::ModelError;

    fn product(name: &str, expiration_date: &str) -> ProductRecord {
        ProductRecord {
            name: name.to_string(),
            expiration_date: expiration_date.to_string(),
            expiration_type: None,
            image_url: String::new(),
            amount: 100.0,
            unit: Unit::Gram,
            category: Category::Other,
        }
    }

    #[test]
    fn test_select_expiring_takes_three_smallest() {
        let products = vec![
            product("a", "2025-04-20"),
            product("b", "2025-04-18"),
            product("c", "2025-04-25"),
            product("d", "2025-04-15"),
        ];

        let selected = select_expiring(&products);
        let dates: Vec<&str> = selected.iter().map(|p| p.expiration_date.as_str()).collect();
        assert_eq!(dates, vec!["2025-04-15", "2025-04-18", "2025-04-20"]);
    }

    #[test]
    fn test_select_expiring_with_fewer_than_three() {
        let products = vec![product("a", "2025-04-20"), product("b", "2025-04-18")];

        let selected = select_expiring(&products);
        let dates: Vec<&str> = selected.iter().map(|p| p.expiration_date.as_str()).collect();
        assert_eq!(dates, vec!["2025-04-18", "2025-04-20"]);
    }

    #[test]
    fn test_menu_prompt_lists_ingredients() {
        let products = vec![product("牛乳", "2025-04-18"), product("豚肉", "2025-04-20")];
        let selected = select_expiring(&products);
        let prompt = build_menu_prompt(&selected);

        assert!(prompt.contains("- 牛乳 (100 g)"));
        assert!(prompt.contains("- 豚肉 (100 g)"));
        assert!(prompt.contains("title"));
    }

    struct FailingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionModel for FailingModel {
        async fn infer(
            &self,
            _prompt: &str,
            _schema: &Value,
            _image: Option<(&str, &[u8])>,
        ) -> Result<Value, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Api {
                status: 500,
                message: "overloaded".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_five_times_with_fixed_delay() {
        let model = Arc::new(FailingModel {
            calls: AtomicUsize::new(0),
        });
        let planner = MenuPlanner::new(model.clone());

        let started = tokio::time::Instant::now();
        let result = planner.suggest(&[product("牛乳", "2025-04-18")]).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("overloaded"));
        assert_eq!(model.calls.load(Ordering::SeqCst), MENU_ATTEMPTS);
        // 5 attempts, 4 pauses of 1 s (virtual clock)
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    struct FlakyModel {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl VisionModel for FlakyModel {
        async fn infer(
            &self,
            _prompt: &str,
            _schema: &Value,
            _image: Option<(&str, &[u8])>,
        ) -> Result<Value, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ModelError::Api {
                    status: 503,
                    message: "try later".to_string(),
                });
            }
            Ok(json!({
                "title": "ミルクスープ",
                "ingredients": ["牛乳", "玉ねぎ"],
                "indication": "鍋で温めるだけです。"
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_successful_parse() {
        let model = Arc::new(FlakyModel {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let planner = MenuPlanner::new(model.clone());

        let suggestion = planner
            .suggest(&[product("牛乳", "2025-04-18")])
            .await
            .unwrap();

        assert_eq!(suggestion.title, "ミルクスープ");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }
}
