//! Tool input DTOs and schema-bearing types
//!
//! Each input is annotated with `JsonSchema`; the generated schema is what
//! MCP clients see as the tool's `inputSchema`.

use schemars::JsonSchema;
use serde::Deserialize;

/// Response detail level for message, thread, and draft reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Full payload with parsed body
    #[default]
    Full,
    /// Headers and labels only
    Metadata,
    /// Ids and labels only
    Minimal,
    /// Base64url-encoded RFC 822 source
    Raw,
}

impl MessageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Metadata => "metadata",
            Self::Minimal => "minimal",
            Self::Raw => "raw",
        }
    }
}

/// Input for tools that take no arguments
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoInput {}

/// Input: `smoke_echo`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EchoInput {
    /// Text echoed back verbatim
    pub message: String,
}

/// Input: `gmail_list_messages`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListMessagesInput {
    /// Gmail search query, e.g. `from:example@gmail.com is:unread`
    #[serde(default)]
    pub query: String,
    /// Maximum messages to return (1..500, default 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Comma-separated label ids, e.g. `INBOX,UNREAD`
    #[serde(default)]
    pub label_ids: String,
    /// Include messages from SPAM and TRASH
    #[serde(default)]
    pub include_spam_trash: bool,
}

/// Input: `gmail_get_message`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetMessageInput {
    /// Gmail message id
    pub message_id: String,
    /// Response format (default `full`)
    #[serde(default)]
    pub format: MessageFormat,
}

/// Input: tools addressing one message by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MessageIdInput {
    /// Gmail message id
    pub message_id: String,
}

/// Input: `gmail_send_message` and `gmail_create_draft`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ComposeInput {
    /// Recipient address(es), comma-separated
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
    /// Carbon-copy address(es), comma-separated
    #[serde(default)]
    pub cc: String,
    /// Blind carbon-copy address(es), comma-separated
    #[serde(default)]
    pub bcc: String,
}

/// Input: `gmail_modify_message`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ModifyMessageInput {
    /// Gmail message id
    pub message_id: String,
    /// Comma-separated label ids to add, e.g. `STARRED,IMPORTANT`
    #[serde(default)]
    pub add_label_ids: String,
    /// Comma-separated label ids to remove, e.g. `UNREAD`
    #[serde(default)]
    pub remove_label_ids: String,
}

/// Input: `gmail_list_threads`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListThreadsInput {
    /// Gmail search query
    #[serde(default)]
    pub query: String,
    /// Maximum threads to return (1..500, default 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Comma-separated label ids
    #[serde(default)]
    pub label_ids: String,
}

/// Input: `gmail_get_thread`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetThreadInput {
    /// Gmail thread id
    pub thread_id: String,
    /// Response format (default `full`)
    #[serde(default)]
    pub format: MessageFormat,
}

/// Input: `gmail_trash_thread`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ThreadIdInput {
    /// Gmail thread id
    pub thread_id: String,
}

/// Input: tools addressing one label by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LabelIdInput {
    /// Label id, e.g. `INBOX` or `Label_12`
    pub label_id: String,
}

/// Input: `gmail_create_label`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateLabelInput {
    /// Display name of the new label
    pub name: String,
    /// Visibility in the label list: `labelShow`, `labelShowIfUnread`, `labelHide`
    #[serde(default = "default_label_list_visibility")]
    pub label_list_visibility: String,
    /// Visibility in the message list: `show` or `hide`
    #[serde(default = "default_message_list_visibility")]
    pub message_list_visibility: String,
}

/// Input: `gmail_update_label`; blank fields are left unchanged
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateLabelInput {
    /// Label id, e.g. `Label_12`
    pub label_id: String,
    /// New display name
    #[serde(default)]
    pub name: String,
    /// New label list visibility: `labelShow`, `labelShowIfUnread`, `labelHide`
    #[serde(default)]
    pub label_list_visibility: String,
    /// New message list visibility: `show` or `hide`
    #[serde(default)]
    pub message_list_visibility: String,
}

/// Input: `gmail_list_drafts`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListDraftsInput {
    /// Maximum drafts to return (1..500, default 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

/// Input: `gmail_get_draft`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetDraftInput {
    /// Gmail draft id
    pub draft_id: String,
    /// Response format (default `full`)
    #[serde(default)]
    pub format: MessageFormat,
}

/// Input: `gmail_update_draft`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateDraftInput {
    /// Gmail draft id
    pub draft_id: String,
    /// Recipient address(es), comma-separated
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
    /// Carbon-copy address(es), comma-separated
    #[serde(default)]
    pub cc: String,
    /// Blind carbon-copy address(es), comma-separated
    #[serde(default)]
    pub bcc: String,
}

impl UpdateDraftInput {
    /// Split into the draft id and the replacement message
    pub fn into_parts(self) -> (String, ComposeInput) {
        let compose = ComposeInput {
            to: self.to,
            subject: self.subject,
            body: self.body,
            cc: self.cc,
            bcc: self.bcc,
        };
        (self.draft_id, compose)
    }
}

/// Input: tools addressing one draft by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DraftIdInput {
    /// Gmail draft id
    pub draft_id: String,
}

/// Default value for `max_results` in list tools
fn default_max_results() -> u32 {
    10
}

fn default_label_list_visibility() -> String {
    "labelShow".to_owned()
}

fn default_message_list_visibility() -> String {
    "show".to_owned()
}
