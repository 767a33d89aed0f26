// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Unencrypted control messages used for channel bootstrap and signer
//! selection. Wire shape: `{type:"config", id, event, params?}` for
//! updates, `{type:"config", id, requestId, response}` for responses.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Marker for the literal `"type": "config"` field. Deserialization of any
/// other string fails, which is what lets the untagged [`Message`] enum
/// tell config messages apart from RPC envelopes.
///
/// [`Message`]: super::Message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigTag;

impl Serialize for ConfigTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("config")
    }
}

impl<'de> Deserialize<'de> for ConfigTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;
        impl<'de> Visitor<'de> for TagVisitor {
            type Value = ConfigTag;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("the string \"config\"")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<ConfigTag, E> {
                if v == "config" {
                    Ok(ConfigTag)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }
        deserializer.deserialize_str(TagVisitor)
    }
}

/// Control events carried by config updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConfigEvent {
    /// The peer finished loading and is ready to receive messages.
    PeerLoaded,
    /// The peer is unloading; the channel must be torn down.
    PeerUnload,
    /// Ask the wallet which signer variant the user chose.
    SelectSignerType,
    /// Announce a newly created legacy relay session to the peer.
    LegacySessionCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigMessage {
    #[serde(rename_all = "camelCase")]
    Update {
        #[serde(rename = "type")]
        tag: ConfigTag,
        id: Uuid,
        event: ConfigEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        #[serde(rename = "type")]
        tag: ConfigTag,
        id: Uuid,
        request_id: Uuid,
        response: serde_json::Value,
    },
}

impl ConfigMessage {
    pub fn update(event: ConfigEvent, params: Option<serde_json::Value>) -> Self {
        ConfigMessage::Update {
            tag: ConfigTag,
            id: Uuid::new_v4(),
            event,
            params,
        }
    }

    /// Builds the response answering `request_id`.
    pub fn response_to(request_id: Uuid, response: serde_json::Value) -> Self {
        ConfigMessage::Response {
            tag: ConfigTag,
            id: Uuid::new_v4(),
            request_id,
            response,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ConfigMessage::Update { id, .. } => *id,
            ConfigMessage::Response { id, .. } => *id,
        }
    }

    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            ConfigMessage::Update { .. } => None,
            ConfigMessage::Response { request_id, .. } => Some(*request_id),
        }
    }
}
