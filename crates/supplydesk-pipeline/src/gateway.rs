//! Ingestion of inbound supplier messages.

use serde::{Deserialize, Serialize};
use supplydesk_core::{ContentType, OperationType};
use supplydesk_db::{NewSubmission, SubmissionInsert};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::queue::ExtractionQueue;
use crate::recovery;

/// A message as delivered by the messaging provider's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    /// Sender phone number.
    pub from: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// A message that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidatedMessage<'a> {
    pub content_type: ContentType,
    pub text: Option<&'a str>,
    pub media_url: Option<&'a str>,
}

pub(crate) fn validate_message(message: &InboundMessage) -> Result<ValidatedMessage<'_>, PipelineError> {
    let content_type: ContentType = message
        .content_type
        .parse()
        .map_err(|_| PipelineError::UnsupportedContentType(message.content_type.clone()))?;

    if message.message_id.trim().is_empty() {
        return Err(PipelineError::MalformedMessage("message_id is empty".to_string()));
    }
    if message.from.trim().is_empty() {
        return Err(PipelineError::MalformedMessage("sender is empty".to_string()));
    }

    let text = message.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let media_url = message
        .media_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    if content_type.requires_media() {
        if media_url.is_none() {
            return Err(PipelineError::MalformedMessage(format!(
                "{content_type} message has no media reference"
            )));
        }
    } else if text.is_none() {
        return Err(PipelineError::MalformedMessage(
            "text message has no text".to_string(),
        ));
    }

    Ok(ValidatedMessage {
        content_type,
        text,
        media_url,
    })
}

/// Accepts an inbound message and hands it to the extraction queue.
///
/// Returns the public id of the new submission. A message that cannot be
/// queued is still accepted; a `webhook` recovery operation dispatches it
/// later.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedContentType`] or
/// [`PipelineError::MalformedMessage`] for messages that can never be
/// processed, [`PipelineError::DuplicateSubmission`] when the message id
/// was seen before, or [`PipelineError::Db`] if persisting fails.
pub async fn receive(
    ctx: &PipelineContext,
    queue: &ExtractionQueue,
    message: &InboundMessage,
) -> Result<Uuid, PipelineError> {
    let validated = validate_message(message)?;

    let supplier = match ctx.services.directory.get_supplier(message.from.trim()).await {
        Ok(supplier) => supplier,
        Err(e) => {
            tracing::warn!(phone = %message.from, error = %e, "supplier lookup failed; storing without name");
            None
        }
    };

    let inserted = supplydesk_db::insert_submission(
        &ctx.pool,
        &NewSubmission {
            source_message_id: message.message_id.trim(),
            supplier_phone: message.from.trim(),
            supplier_id: supplier.as_ref().map(|s| s.id.as_str()),
            supplier_name: supplier.as_ref().map(|s| s.name.as_str()),
            content_type: validated.content_type,
            content: validated.text,
            media_url: validated.media_url,
        },
    )
    .await?;

    let submission = match inserted {
        SubmissionInsert::Created(row) => row,
        SubmissionInsert::Duplicate(existing) => {
            tracing::info!(
                message_id = %message.message_id,
                submission_id = %existing.public_id,
                "duplicate message ignored"
            );
            return Err(PipelineError::DuplicateSubmission {
                message_id: message.message_id.clone(),
                existing: existing.public_id,
            });
        }
    };

    match queue.enqueue(submission.id) {
        Ok(()) => supplydesk_db::mark_dispatched(&ctx.pool, submission.id).await?,
        Err(e) => {
            tracing::warn!(
                submission_id = submission.id,
                error = %e,
                "could not queue submission; scheduling dispatch retry"
            );
            recovery::schedule_failure(
                ctx,
                submission.id,
                None,
                OperationType::Webhook,
                &format!("could not queue for extraction: {e}"),
            )
            .await?;
        }
    }

    tracing::info!(
        submission_id = %submission.public_id,
        content_type = %validated.content_type,
        supplier = submission.supplier_key(),
        "submission received"
    );
    Ok(submission.public_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content_type: &str, text: Option<&str>, media_url: Option<&str>) -> InboundMessage {
        InboundMessage {
            message_id: "wamid.1".to_string(),
            from: "+34600000001".to_string(),
            content_type: content_type.to_string(),
            text: text.map(str::to_string),
            media_url: media_url.map(str::to_string),
        }
    }

    #[test]
    fn unknown_content_type_is_unsupported() {
        let err = validate_message(&message("sticker", None, Some("m/1"))).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedContentType(t) if t == "sticker"));
    }

    #[test]
    fn text_message_needs_text() {
        let err = validate_message(&message("text", Some("   "), None)).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedMessage(_)));
    }

    #[test]
    fn media_message_needs_media_reference() {
        for kind in ["image", "pdf", "voice"] {
            let err = validate_message(&message(kind, Some("caption"), None)).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedMessage(_)), "{kind}");
        }
    }

    #[test]
    fn image_with_caption_keeps_both() {
        let msg = message("image", Some(" 20 units "), Some("media/abc"));
        let validated = validate_message(&msg).unwrap();
        assert_eq!(validated.content_type, ContentType::Image);
        assert_eq!(validated.text, Some("20 units"));
        assert_eq!(validated.media_url, Some("media/abc"));
    }

    #[test]
    fn inbound_message_uses_provider_field_names() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"message_id":"wamid.9","from":"+1555","type":"text","text":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.content_type, "text");
        assert!(msg.media_url.is_none());
    }
}
