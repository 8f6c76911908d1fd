// SPDX-License-Identifier: MIT

//! Turns an [`ErrorContext`] into something a business user can act on
//!
//! Only called once the executor has given up on a failure. The technical
//! details travel alongside the user-facing text, never inside it.

use serde::{Deserialize, Serialize};

use super::category::{ErrorCategory, Severity};
use super::context::ErrorContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub title: String,
    pub message: String,
    pub suggested_actions: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalDetails {
    pub category: ErrorCategory,
    pub technical_note: String,
    pub session_id: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedError {
    pub user_message: UserMessage,
    pub technical_details: TechnicalDetails,
    pub recovery_suggestions: Vec<String>,
}

struct Template {
    title: &'static str,
    message: &'static str,
    actions: &'static [&'static str],
    technical_note: &'static str,
}

fn template_for(category: ErrorCategory) -> Option<Template> {
    let template = match category {
        ErrorCategory::Quota => Template {
            title: "Data Processing Limit Reached",
            message: "The system has reached its data processing limit. This usually resolves quickly.",
            actions: &[
                "Wait 2-3 minutes and try again",
                "Use a more specific date range",
                "Focus on a particular brand or product category",
            ],
            technical_note: "Query quota exceeded",
        },
        ErrorCategory::Syntax => Template {
            title: "Query Generation Issue",
            message: "There was an issue generating the database query for your question.",
            actions: &[
                "The system will automatically try a different approach",
                "If the issue persists, try rephrasing your question",
                "Use more specific business terms",
            ],
            technical_note: "SQL syntax error",
        },
        ErrorCategory::Permission => Template {
            title: "Access Restricted",
            message: "The analysis needs data you do not currently have access to.",
            actions: &[
                "Ask your administrator for access to the dataset",
                "Try a question about data you already work with",
            ],
            technical_note: "Permission denied by the data service",
        },
        ErrorCategory::Timeout => Template {
            title: "Processing Timeout",
            message: "Your request is taking longer than expected to process.",
            actions: &[
                "The system will automatically retry with a simplified approach",
                "Try asking a more specific question",
                "Break complex questions into smaller parts",
            ],
            technical_note: "Request timeout",
        },
        ErrorCategory::OversizedResult => Template {
            title: "Dataset Too Large",
            message: "The requested analysis covers a very large dataset that may be difficult to process.",
            actions: &[
                "Narrow your date range (e.g., last quarter instead of last year)",
                "Focus on specific brands, categories, or channels",
                "Request summary statistics instead of detailed data",
            ],
            technical_note: "Data volume exceeds processing limits",
        },
        ErrorCategory::EmptyResult => Template {
            title: "No Data Found",
            message: "Your query didn't return any data. This might be due to filters that are too restrictive.",
            actions: &[
                "Expand your date range",
                "Remove specific brand or category filters",
                "Check if the requested data exists in our system",
                "Try a broader version of your question",
            ],
            technical_note: "Query returned zero results",
        },
        ErrorCategory::InvalidQuestion => Template {
            title: "Question Not Understood",
            message: "I'm having trouble understanding your business question.",
            actions: &[
                "Try rephrasing using business terms like 'revenue', 'profit', 'sales'",
                "Specify a time period (e.g., 'last quarter', 'this year')",
                "Mention specific metrics you're interested in",
                "Look at the example questions for guidance",
            ],
            technical_note: "Question classification failed",
        },
        ErrorCategory::CircuitOpen => Template {
            title: "Service Temporarily Unavailable",
            message: "A service this analysis depends on is failing repeatedly and has been paused.",
            actions: &[
                "Wait a minute and try again",
                "Contact support if the issue persists",
            ],
            technical_note: "Circuit breaker open",
        },
        ErrorCategory::ContextLength | ErrorCategory::Unclassified => return None,
    };
    Some(template)
}

fn default_template(severity: Severity) -> Template {
    if severity == Severity::Critical {
        Template {
            title: "System Error",
            message: "A system error occurred while processing your request.",
            actions: &[
                "Please try again in a few minutes",
                "Contact support if the issue persists",
            ],
            technical_note: "Unhandled system error",
        }
    } else {
        Template {
            title: "Processing Issue",
            message: "There was an issue processing your request.",
            actions: &[
                "Try rephrasing your question",
                "Check that your question is about business data analysis",
            ],
            technical_note: "General processing error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslator;

impl ErrorTranslator {
    pub fn new() -> Self {
        Self
    }

    pub fn translate(&self, ctx: &ErrorContext) -> TranslatedError {
        let template = template_for(ctx.category).unwrap_or_else(|| default_template(ctx.severity));

        let mut message = template.message.to_string();
        if ctx.retry_count > 1 {
            message.push_str(&format!(" (Attempt {})", ctx.retry_count));
        }

        let mut actions: Vec<String> = template.actions.iter().map(|a| a.to_string()).collect();
        if let Some(hint) = contextual_hint(ctx) {
            actions.insert(0, hint.to_string());
        }

        TranslatedError {
            user_message: UserMessage {
                title: template.title.to_string(),
                message,
                suggested_actions: actions,
                severity: ctx.severity,
            },
            technical_details: TechnicalDetails {
                category: ctx.category,
                technical_note: template.technical_note.to_string(),
                session_id: ctx.session_id.clone(),
                retry_count: ctx.retry_count,
            },
            recovery_suggestions: ctx.recovery_suggestions.clone(),
        }
    }
}

/// A tip drawn from wording in the user's own request
fn contextual_hint(ctx: &ErrorContext) -> Option<&'static str> {
    let request = ctx.user_request.to_lowercase();
    match ctx.category {
        ErrorCategory::EmptyResult if request.contains("brand") => {
            Some("Check the spelling of the brand name")
        }
        ErrorCategory::OversizedResult | ErrorCategory::Quota if request.contains("year") => {
            Some("Try analyzing by quarter instead of the full year")
        }
        ErrorCategory::OversizedResult | ErrorCategory::Quota if request.contains("quarter") => {
            Some("Try analyzing month by month instead of the full quarter")
        }
        _ => None,
    }
}
