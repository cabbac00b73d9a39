//! Real-time message envelope shared by both directions of a connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    // server -> client
    Welcome,
    GameUpdate,
    PlayerJoined,
    PlayerLeft,
    GameCreated,
    // client -> server (parsed, not dispatched; REST stays the command path)
    JoinTable,
    LeaveTable,
    PlaceBet,
    Hit,
    Stand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            game_id: None,
            table_id: None,
            player_id: None,
            data: None,
        }
    }

    pub fn game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }

    pub fn player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    /// Attaches a payload. A payload that fails to serialize is left out.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => self.data = Some(value),
            Err(err) => {
                tracing::warn!(error = %err, kind = ?self.kind, "dropping unserializable payload");
            }
        }
        self
    }

    pub fn welcome(player_id: &str, table_id: &str) -> Self {
        Self::new(MessageType::Welcome).with_data(&serde_json::json!({
            "message": "Connected to BlackJack game server",
            "playerId": player_id,
            "tableId": table_id,
        }))
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_fields_are_omitted() {
        let env = Envelope::new(MessageType::PlayerLeft)
            .table("t1")
            .player("p1");
        let json = serde_json::to_value(&env).expect("serialize");
        assert_eq!(json, json!({"type": "playerLeft", "tableId": "t1", "playerId": "p1"}));
    }

    #[test]
    fn parses_client_commands() {
        let env = Envelope::parse(r#"{"type":"placeBet","gameId":"g","data":{"amount":25}}"#)
            .expect("parse");
        assert_eq!(env.kind, MessageType::PlaceBet);
        assert_eq!(env.game_id.as_deref(), Some("g"));
        assert_eq!(env.data.unwrap()["amount"], 25);
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(Envelope::parse(r#"{"type":"doubleDown"}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn welcome_names_the_connection() {
        let json = serde_json::to_value(Envelope::welcome("p9", "t3")).expect("serialize");
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["data"]["playerId"], "p9");
        assert_eq!(json["data"]["tableId"], "t3");
    }
}
