//! Function router for voice-assistant tool calls.
//!
//! Each function takes the call's parameter object and returns a JSON result
//! carrying at least `result` (spoken text) and `success`.

use crate::state::now_rfc3339;
use serde_json::{json, Map, Value};

/// Gateway facts some functions report back.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectSnapshot {
    pub listening: bool,
    pub conversation_count: usize,
}

pub const FUNCTIONS: [&str; 5] = [
    "analyze_code",
    "suggest_break",
    "analyze_sentiment",
    "get_project_status",
    "provide_encouragement",
];

/// Run a function by name. `None` if the name is unknown.
pub fn dispatch(name: &str, params: &Map<String, Value>, snapshot: ProjectSnapshot) -> Option<Value> {
    let result = match name {
        "analyze_code" => analyze_code(params),
        "suggest_break" => suggest_break(params),
        "analyze_sentiment" => analyze_sentiment(params),
        "get_project_status" => get_project_status(snapshot),
        "provide_encouragement" => provide_encouragement(params),
        _ => return None,
    };
    Some(result)
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub fn analyze_code(params: &Map<String, Value>) -> Value {
    let file_path = str_param(params, "file_path");
    let code = str_param(params, "code_content");
    if file_path.is_empty() && code.is_empty() {
        return json!({"result": "No code provided for analysis", "success": false});
    }

    let target = if file_path.is_empty() { "code_snippet" } else { file_path };
    let mut complexity = "medium";
    let mut suggestions = vec!["Consider adding comments", "Review variable naming"];
    let mut analysis = json!({
        "issues": [],
        "file_analyzed": target,
    });
    if !code.is_empty() {
        let line_count = code.split('\n').count();
        analysis["line_count"] = json!(line_count);
        if line_count > 50 {
            complexity = "high";
            suggestions.push("Consider breaking into smaller functions");
        }
    }
    analysis["complexity"] = json!(complexity);
    analysis["suggestions"] = json!(suggestions);

    json!({
        "result": format!("Code analysis complete for {}", target),
        "analysis": analysis,
        "success": true,
    })
}

pub fn suggest_break(params: &Map<String, Value>) -> Value {
    let stress_level = params
        .get("stress_level")
        .and_then(Value::as_str)
        .unwrap_or("medium");
    let work_duration = params
        .get("work_duration")
        .and_then(Value::as_f64)
        .unwrap_or(60.0);

    let mut suggestion = match stress_level {
        "low" => "You're doing great! Consider a 5-minute stretch break.",
        "high" => "You need a proper break! Take 20-30 minutes, go for a walk, or do something relaxing.",
        _ => "Take a 10-15 minute break. Get some water and step away from the screen.",
    }
    .to_string();
    if work_duration > 120.0 {
        suggestion.push_str(" You've been working for over 2 hours - definitely time for a break!");
    }

    json!({
        "result": suggestion,
        "stress_level": stress_level,
        "work_duration": params.get("work_duration").cloned().unwrap_or(json!(60)),
        "success": true,
    })
}

/// Mood scoring lives outside this service; report that plainly.
pub fn analyze_sentiment(params: &Map<String, Value>) -> Value {
    let text = str_param(params, "text");
    if text.is_empty() {
        return json!({"result": "No text provided for sentiment analysis", "success": false});
    }
    json!({
        "result": "Sentiment analysis is not available on this duck",
        "context": str_param(params, "context"),
        "success": false,
    })
}

pub fn get_project_status(snapshot: ProjectSnapshot) -> Value {
    json!({
        "result": "Project status retrieved successfully",
        "status": {
            "overall_health": "good",
            "active_issues": 0,
            "last_analysis": now_rfc3339(),
            "listening_status": snapshot.listening,
            "conversation_count": snapshot.conversation_count,
        },
        "success": true,
    })
}

fn encouragement_for(mood: &str) -> &'static str {
    match mood {
        "frustrated" => "Take a deep breath! Every developer faces challenges - you've got this!",
        "confused" => {
            "Confusion is the beginning of understanding. Break the problem down into smaller pieces."
        }
        "stressed" => "Stress is a sign you care about your work, but don't let it overwhelm you.",
        _ => "Keep up the great work! You're making progress.",
    }
}

pub fn provide_encouragement(params: &Map<String, Value>) -> Value {
    let mood = params.get("mood").and_then(Value::as_str).unwrap_or("neutral");
    let context = str_param(params, "context");

    let mut message = encouragement_for(mood).to_string();
    if !context.is_empty() {
        message.push_str(&format!(
            " Remember, you're working on {} - that's valuable work!",
            context
        ));
    }

    json!({
        "result": message,
        "mood": mood,
        "context": context,
        "success": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_analyze_code_complexity() {
        let short = analyze_code(&params(json!({"code_content": "fn main() {}\n"})));
        assert_eq!(short["success"], true);
        assert_eq!(short["analysis"]["complexity"], "medium");
        assert_eq!(short["analysis"]["line_count"], 2);
        assert_eq!(short["analysis"]["file_analyzed"], "code_snippet");

        let long_code = "x\n".repeat(60);
        let long = analyze_code(&params(json!({"file_path": "src/lib.rs", "code_content": long_code})));
        assert_eq!(long["analysis"]["complexity"], "high");
        assert_eq!(long["analysis"]["suggestions"].as_array().unwrap().len(), 3);
        assert_eq!(long["result"], "Code analysis complete for src/lib.rs");

        let empty = analyze_code(&Map::new());
        assert_eq!(empty["success"], false);
    }

    #[test]
    fn test_suggest_break_long_session() {
        let result = suggest_break(&params(json!({"stress_level": "high", "work_duration": 180})));
        let text = result["result"].as_str().unwrap();
        assert!(text.starts_with("You need a proper break!"));
        assert!(text.contains("over 2 hours"));

        let default = suggest_break(&Map::new());
        assert_eq!(default["stress_level"], "medium");
        assert_eq!(default["work_duration"], 60);
        assert!(!default["result"].as_str().unwrap().contains("over 2 hours"));
    }

    #[test]
    fn test_encouragement_with_context() {
        let result = provide_encouragement(&params(json!({"mood": "confused", "context": "the parser"})));
        let text = result["result"].as_str().unwrap();
        assert!(text.starts_with("Confusion is the beginning"));
        assert!(text.ends_with("working on the parser - that's valuable work!"));

        let unknown = provide_encouragement(&params(json!({"mood": "sleepy"})));
        assert_eq!(unknown["mood"], "sleepy");
        assert_eq!(unknown["result"], "Keep up the great work! You're making progress.");
    }

    #[test]
    fn test_dispatch() {
        let snapshot = ProjectSnapshot {
            listening: true,
            conversation_count: 4,
        };
        let status = dispatch("get_project_status", &Map::new(), snapshot).unwrap();
        assert_eq!(status["status"]["listening_status"], true);
        assert_eq!(status["status"]["conversation_count"], 4);

        let sentiment = dispatch("analyze_sentiment", &params(json!({"text": "ugh"})), snapshot).unwrap();
        assert_eq!(sentiment["success"], false);

        assert!(dispatch("launch_rockets", &Map::new(), snapshot).is_none());
        for name in FUNCTIONS {
            assert!(dispatch(name, &Map::new(), snapshot).is_some());
        }
    }
}
