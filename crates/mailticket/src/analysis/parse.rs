//! Prompt construction and normalization of the model's JSON answer.

use serde::Deserialize;
use serde_json::Value;

use super::AnalysisError;
use crate::tickets::{Analysis, Category, Priority, Sentiment, Tone};

/// Confidence used when the model omits it.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Builds the analysis prompt for an email body.
pub fn build_prompt(subject: &str, body: &str) -> String {
    format!(
        r#"Analyze this customer support email and provide structured information.

Subject: {subject}

Email:
{body}

Return ONLY valid JSON with this exact structure:
{{
    "summary": ["3-5 bullet points summarizing the email"],
    "key_points": ["specific date/name/number", "action item", "critical info"],
    "category": "Sales|Support|General|Marketing|HR",
    "priority": "High|Medium|Low",
    "sentiment": {{"tone": "Positive|Neutral|Negative|Urgent", "confidence": 0.95}},
    "reply": "Professional 2-4 paragraph reply with greeting and closing"
}}

Categories guide:
- Sales: proposals, pricing, purchases, orders, deals
- Support: issues, problems, help, bugs, technical questions
- General: general communication, updates, casual messages
- Marketing: campaigns, newsletters, promotions, webinars
- HR: recruitment, interviews, performance, team matters

Priority guide:
- High: urgent, deadline-driven, requires immediate action
- Medium: important but not urgent, can wait 1-2 days
- Low: informational, FYI, no immediate action needed

Sentiment guide:
- Positive: friendly, thankful, enthusiastic
- Neutral: informational, professional
- Negative: complaint, frustration, anger
- Urgent: time-sensitive, requires immediate attention"#
    )
}

/// Loosely typed model answer; every field may be missing or mistyped.
#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Value,
    #[serde(default)]
    key_points: Value,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    sentiment: Option<RawSentiment>,
    #[serde(default)]
    reply: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parses and normalizes the model's answer.
pub fn parse_analysis(response: &str) -> Result<Analysis, AnalysisError> {
    let json = extract_json(response);
    let raw: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| AnalysisError::ResponseParse(e.to_string()))?;
    Ok(normalize(raw))
}

fn normalize(raw: RawAnalysis) -> Analysis {
    let summary = match raw.summary {
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .map(|s| format!("• {s}"))
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        Value::Null => None,
        other => Some(value_text(&other)).filter(|s| !s.is_empty()),
    };

    let key_points = match raw.key_points {
        Value::Array(items) => items.iter().map(value_text).filter(|s| !s.is_empty()).collect(),
        Value::Null => Vec::new(),
        other => vec![value_text(&other)],
    };

    let category = raw
        .category
        .and_then(|c| c.trim().parse::<Category>().ok())
        .unwrap_or(Category::General);
    let priority = raw
        .priority
        .and_then(|p| p.trim().parse::<Priority>().ok())
        .unwrap_or(Priority::Medium);
    let sentiment = raw.sentiment.unwrap_or_default();
    let tone = sentiment
        .tone
        .and_then(|t| t.trim().parse::<Tone>().ok())
        .unwrap_or(Tone::Neutral);
    let confidence = sentiment
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    Analysis {
        summary,
        key_points,
        category: Some(category),
        priority,
        sentiment: Some(Sentiment { tone, confidence }),
        suggested_reply: raw.reply.filter(|r| !r.trim().is_empty()),
        degraded: false,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extracts the first JSON object from the response, skipping markdown
/// fences or prose around it. Tracks string boundaries so braces inside
/// strings do not count.
fn extract_json(response: &str) -> &str {
    let Some(start) = response.find('{') else {
        return response.trim();
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut end = response.len();

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    &response[start..end]
}
