//! Wire messages exchanged between nodes and with clients

use serde::{Deserialize, Serialize};

/// Node identity. Also the election priority: higher wins.
pub type NodeId = u64;

pub type AccountId = String;

/// Balances and deltas are kept in minor units.
pub type Balance = i64;

/// A ledger mutation submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub account_id: AccountId,
    pub delta: Balance,
}

impl Operation {
    pub fn new(account_id: impl Into<AccountId>, delta: Balance) -> Self {
        Self {
            account_id: account_id.into(),
            delta,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(crate::Error::InvalidOperation(
                "account id cannot be empty".into(),
            ));
        }
        if self.account_id.chars().any(|c| c.is_control()) {
            return Err(crate::Error::InvalidOperation(
                "account id contains invalid characters".into(),
            ));
        }
        Ok(())
    }
}

/// Peer-to-peer protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ElectionRequest {
        from: NodeId,
    },
    ElectionAck {
        from: NodeId,
    },
    CoordinatorAnnouncement {
        leader: NodeId,
        tenure: u64,
    },
    Heartbeat {
        leader: NodeId,
        tenure: u64,
    },
    ReplicateOperation {
        order_key: u64,
        tenure: u64,
        leader: NodeId,
        operation: Operation,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ElectionRequest { .. } => "election_request",
            Message::ElectionAck { .. } => "election_ack",
            Message::CoordinatorAnnouncement { .. } => "coordinator_announcement",
            Message::Heartbeat { .. } => "heartbeat",
            Message::ReplicateOperation { .. } => "replicate_operation",
        }
    }
}

/// A message together with its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub message: Message,
}

/// Client request body for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOperation {
    pub account_id: AccountId,
    pub delta: Balance,
}

impl From<SubmitOperation> for Operation {
    fn from(req: SubmitOperation) -> Self {
        Operation::new(req.account_id, req.delta)
    }
}

/// Reply to a client submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_order_key: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenure: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_leader: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResult {
    pub fn rejected(known_leader: Option<NodeId>, error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            applied_order_key: None,
            tenure: None,
            known_leader,
            balance: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_is_tagged() {
        let msg = Message::CoordinatorAnnouncement {
            leader: 3,
            tenure: 7,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "coordinator_announcement");
        assert_eq!(json["leader"], 3);
        assert_eq!(json["tenure"], 7);
        assert_eq!(msg.kind(), "coordinator_announcement");
    }

    #[test]
    fn test_replicate_operation_from_json() {
        let raw = r#"{"type":"replicate_operation","order_key":1,"tenure":5,"leader":2,
                      "operation":{"account_id":"A","delta":200}}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            Message::ReplicateOperation {
                order_key: 1,
                tenure: 5,
                leader: 2,
                operation: Operation::new("A", 200),
            }
        );
    }

    #[test]
    fn test_rejected_result_omits_empty_fields() {
        let json = serde_json::to_value(SubmitResult::rejected(Some(2), "not leader")).unwrap();
        assert_eq!(json["accepted"], false);
        assert_eq!(json["known_leader"], 2);
        assert!(json.get("applied_order_key").is_none());
    }

    #[test]
    fn test_validate_operation() {
        assert!(Operation::new("ACC001", 10).validate().is_ok());
        assert!(Operation::new("  ", 10).validate().is_err());
        assert!(Operation::new("a\nb", 10).validate().is_err());
    }
}
