//! Template resolution and rendering (spec.md §4.9 step 2a/2b).

use std::collections::HashMap;

use job_core::NotificationError;

pub const FALLBACK_LANGUAGE: &str = "en-US";
pub const PREFERRED_LANGUAGE: &str = "tr-TR";
pub const SMS_MAX_CHARS: usize = 160;

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Persistence-backed template lookup, implemented by `job-postgres` against
/// the `notification_templates` table.
#[async_trait::async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn find(&self, kind: &str, channel: &str, language: &str) -> anyhow::Result<Option<Template>>;
}

/// Resolves `(kind, channel, language)`, falling back from `tr-TR` to
/// `en-US` when the preferred language has no template (spec.md §4.9 step
/// 2a).
pub async fn resolve_with_fallback(
    resolver: &dyn TemplateResolver,
    kind: &str,
    channel: &str,
    language: &str,
) -> Result<Template, NotificationError> {
    if let Some(template) = resolver
        .find(kind, channel, language)
        .await
        .map_err(NotificationError::Storage)?
    {
        return Ok(template);
    }
    if language != FALLBACK_LANGUAGE {
        if let Some(template) = resolver
            .find(kind, channel, FALLBACK_LANGUAGE)
            .await
            .map_err(NotificationError::Storage)?
        {
            return Ok(template);
        }
    }
    Err(NotificationError::TemplateNotFound {
        kind: kind.to_string(),
        channel: channel.to_string(),
        language: language.to_string(),
    })
}

/// `{var}` placeholder substitution. SMS rendering must not exceed 160
/// characters (spec.md §4.9 step 2b); exceeding it is a render error for
/// that (license, channel) pair only, never a scanner-wide abort.
pub fn render(template: &Template, variables: &HashMap<String, String>, is_sms: bool) -> Result<(Option<String>, String), NotificationError> {
    let body = substitute(&template.body, variables);
    if is_sms && body.chars().count() > SMS_MAX_CHARS {
        return Err(NotificationError::Render(format!(
            "rendered SMS body is {} characters, exceeds {SMS_MAX_CHARS}",
            body.chars().count()
        )));
    }
    let subject = template.subject.as_ref().map(|s| substitute(s, variables));
    Ok((subject, body))
}

fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut key = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == '}' {
                    closed = true;
                    break;
                }
                key.push(next);
            }
            if closed {
                if let Some(value) = variables.get(&key) {
                    out.push_str(value);
                    continue;
                }
                out.push('{');
                out.push_str(&key);
                out.push('}');
                continue;
            }
            out.push('{');
            out.push_str(&key);
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables_and_leaves_unknown_alone() {
        let mut vars = HashMap::new();
        vars.insert("user_name".to_string(), "Ada".to_string());
        let rendered = substitute("Hello {user_name}, see {missing}", &vars);
        assert_eq!(rendered, "Hello Ada, see {missing}");
    }

    #[test]
    fn sms_over_limit_is_rejected() {
        let template = Template {
            id: "t1".into(),
            subject: None,
            body: "x".repeat(200),
        };
        let err = render(&template, &HashMap::new(), true).unwrap_err();
        assert!(matches!(err, NotificationError::Render(_)));
    }

    #[test]
    fn email_ignores_sms_length_cap() {
        let template = Template {
            id: "t1".into(),
            subject: Some("Subject".into()),
            body: "x".repeat(200),
        };
        assert!(render(&template, &HashMap::new(), false).is_ok());
    }
}
