use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use crate::models::ProductRecord;
use crate::services::{BlobStore, VisionModel};

/// Extraction instruction sent with every product photo. Date interpretation
/// (two-digit years are 20xx, missing time becomes 00:00:00) is done by the
/// model, not by us.
pub const EXTRACTION_PROMPT: &str = "この写真から以下の情報をJSON形式で出力してください：\n\
1. 商品名 (日本語で)\n\
2. 賞味期限または消費期限（ISO 8601形式で）\n\
   - 日付の解釈に注意してください。例えば「25.4.28」は「2025年4月28日」と解釈してください\n\
   - 年が2桁で表記されている場合は、2000年代として解釈してください\n\
   - 時間が記載されている場合は、その時間も含めて出力してください（例：2025-04-28T14:30:00Z）\n\
   - 時間が記載されていない場合は、00:00:00として出力してください\n\
3. 期限の種類（賞味期限なら best_before、消費期限なら use_by）\n\
4. 画像URL（空文字列で構いません）\n\
5. 分量（数値のみ、例：300）\n\
6. 単位（以下のいずれかから選択）：g、kg、ml、L、個、枚、本\n\
7. 分類（以下のいずれかから選択）：\n\
   - 肉\n\
   - 野菜\n\
   - 魚\n\
   - 調味料\n\
   - お菓子\n\
   - 飲料\n\
   - その他\n\
JSONのキーは以下の通りです：\n\
- name\n\
- expiration_date\n\
- expiration_type\n\
- image_url\n\
- amount\n\
- unit\n\
- category";

/// Response schema in Gemini's OpenAPI-style format. `expiration_type` is not
/// required: labels without 賞味期限/消費期限 wording leave it out.
pub fn product_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "expiration_date": { "type": "STRING" },
            "expiration_type": { "type": "STRING", "enum": ["best_before", "use_by"] },
            "image_url": { "type": "STRING" },
            "amount": { "type": "NUMBER" },
            "unit": { "type": "STRING", "enum": ["g", "kg", "ml", "L", "個", "枚", "本"] },
            "category": {
                "type": "STRING",
                "enum": ["肉", "野菜", "魚", "調味料", "お菓子", "飲料", "その他"]
            }
        },
        "required": ["name", "expiration_date", "image_url", "amount", "unit", "category"]
    })
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => ".jpg",
    }
}

/// Photo → stored image + structured `ProductRecord`. Shared by the `/analyze`
/// endpoint and the chat image handler.
pub struct ProductAnalyzer {
    storage: Arc<dyn BlobStore>,
    model: Arc<dyn VisionModel>,
}

impl ProductAnalyzer {
    pub fn new(storage: Arc<dyn BlobStore>, model: Arc<dyn VisionModel>) -> Self {
        Self { storage, model }
    }

    pub async fn analyze(&self, content_type: &str, data: &[u8]) -> Result<ProductRecord> {
        log::info!("📸 Analyzing {} image ({} bytes)", content_type, data.len());

        // Scratch copy for the upload; removed on every exit path when dropped.
        let mut temp = NamedTempFile::new()?;
        temp.write_all(data)?;

        let image_url = self
            .storage
            .put_file(temp.path(), extension_for(content_type))
            .await?;

        let value = self
            .model
            .infer(EXTRACTION_PROMPT, &product_schema(), Some((content_type, data)))
            .await?;

        let mut record: ProductRecord = serde_json::from_value(value)?;
        // The model is told to emit an empty image_url, but we overwrite it
        // unconditionally with the URL of this upload.
        record.image_url = image_url;

        log::info!(
            "✅ Recognized: {} ({} {}, {})",
            record.name,
            record.amount,
            record.unit,
            record.category
        );
        Ok(record)
    }
}
