use serde::{Deserialize, Serialize};

/// Embed colour used for relayed context blocks.
pub const RELAY_EMBED_COLOR: u32 = 0x3498db;

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// A message posted in a participating group, as seen by the intake layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub author_id: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub guild_id: String,
    pub guild_name: String,
    pub guild_icon_url: Option<String>,
    pub channel_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// The rendered outbound message fanned out to every destination.
///
/// Immutable once built; the dispatcher shares it across delivery tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub embeds: Vec<Embed>,
}

impl RelayPayload {
    /// Render an inbound message with already-moderated `content`.
    pub fn from_inbound(msg: &InboundMessage, content: impl Into<String>) -> Self {
        let mut embed = Embed {
            color: RELAY_EMBED_COLOR,
            footer: Some(EmbedFooter {
                text: format!("From: {} | User ID: {}", msg.guild_name, msg.author_id),
                icon_url: msg.guild_icon_url.clone(),
            }),
            fields: Vec::new(),
        };
        if !msg.attachments.is_empty() {
            let links = msg
                .attachments
                .iter()
                .map(|a| format!("[{}]({})", a.name, a.url))
                .collect::<Vec<_>>()
                .join("\n");
            embed.fields.push(EmbedField {
                name: "Attachments".into(),
                value: links,
                inline: false,
            });
        }

        Self {
            display_name: format!("{} | {}", msg.author_name, msg.guild_name),
            avatar_url: msg.author_avatar_url.clone(),
            content: content.into(),
            embeds: vec![embed],
        }
    }

    /// Relayed messages never ping anyone in the destination group.
    pub fn suppress_mentions(&self) -> bool {
        true
    }
}
