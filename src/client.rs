//! Test client: builds one event and fires it at a collector

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::net::UdpSocket;
use tracing::info;
use zonelog::event::EventMessage;

use crate::cli::SendArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn send(args: SendArgs) -> Result<(), AnyError> {
    let message = build_message(&args)?;
    let payload = message.encode()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(&payload, args.to).await?;
    info!(to = %args.to, id = %args.id, size = payload.len(), "Message sent");

    Ok(())
}

fn build_message(args: &SendArgs) -> Result<EventMessage, AnyError> {
    let mut attributes = BTreeMap::new();
    for field in &args.fields {
        let (key, raw) = field
            .split_once('=')
            .ok_or_else(|| format!("field must be KEY=VALUE, got {field}"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        attributes.insert(key.to_string(), value);
    }

    Ok(EventMessage {
        id: Some(args.id.clone()),
        action: args.action.clone(),
        message_id: args.message_id.clone(),
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(fields: &[&str]) -> SendArgs {
        SendArgs {
            to: "127.0.0.1:31239".parse().unwrap(),
            id: "aaa".to_string(),
            action: None,
            message_id: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_fields_keep_json_types() {
        let message = build_message(&args(&["a=123", "b=tere tere", "u=☹️"])).unwrap();
        assert_eq!(message.id.as_deref(), Some("aaa"));
        assert_eq!(message.attributes["a"], json!(123));
        assert_eq!(message.attributes["b"], json!("tere tere"));
        assert_eq!(message.attributes["u"], json!("☹️"));
    }

    #[test]
    fn test_field_without_separator_is_rejected() {
        assert!(build_message(&args(&["nonsense"])).is_err());
    }
}
