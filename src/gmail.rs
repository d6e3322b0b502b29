//! Gmail REST tools
//!
//! Every tool validates its typed input, builds an [`HttpRequest`] under
//! `/gmail/v1/users/me`, and sends it through the `gmail` connection. The
//! handlers never see the access token; the dispatch context injects it.

use serde_json::{Map, Value, json};

use crate::catalog::{ToolCatalog, ToolMeta, ToolOutput};
use crate::connection::{Connection, SecretKeys};
use crate::dispatch::{DispatchContext, HttpMethod, HttpRequest};
use crate::errors::{AppError, AppResult};
use crate::mime::encode_raw_message;
use crate::models::{
    ComposeInput, CreateLabelInput, DraftIdInput, GetDraftInput, GetMessageInput, GetThreadInput,
    LabelIdInput, ListDraftsInput, ListMessagesInput, ListThreadsInput, MessageIdInput,
    ModifyMessageInput, NoInput, ThreadIdInput, UpdateDraftInput, UpdateLabelInput,
};

/// Connection name used by every Gmail tool
pub const CONNECTION: &str = "gmail";
/// Environment variable holding the OAuth access token
pub const TOKEN_ENV: &str = "GMAIL_ACCESS_TOKEN";

const USER_ROOT: &str = "/gmail/v1/users/me";
const MAX_RESULTS_CAP: u32 = 500;
const LABEL_LIST_VISIBILITY: &[&str] = &["labelShow", "labelShowIfUnread", "labelHide"];
const MESSAGE_LIST_VISIBILITY: &[&str] = &["show", "hide"];

/// The `gmail` connection pointed at `base_url`
///
/// # Errors
///
/// Returns `InvalidInput` if `base_url` is not an absolute http(s) URL.
pub fn connection(base_url: &str) -> AppResult<Connection> {
    Connection::new(
        CONNECTION,
        SecretKeys::token(TOKEN_ENV),
        base_url,
        "Bearer {api_key}",
    )
}

/// Register all Gmail tools, in listing order
pub fn register(catalog: &mut ToolCatalog) -> AppResult<()> {
    catalog.register_tool(
        ToolMeta::new(
            "gmail_list_messages",
            "List messages in the user's Gmail mailbox. Supports search queries like \
             'from:example@gmail.com is:unread'.",
        )
        .tags(&["message", "read"])
        .read_only(true),
        list_messages,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_get_message",
            "Get a specific message by ID. Returns full message content including headers and body.",
        )
        .tags(&["message", "read"])
        .read_only(true),
        get_message,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_send_message",
            "Send an email message to specified recipients.",
        )
        .tags(&["message", "write"]),
        send_message,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_trash_message", "Move a message to trash.")
            .tags(&["message", "write"]),
        trash_message,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_untrash_message", "Remove a message from trash.")
            .tags(&["message", "write"]),
        untrash_message,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_modify_message",
            "Modify labels on a message. Add or remove labels like INBOX, STARRED, IMPORTANT, etc.",
        )
        .tags(&["message", "write"]),
        modify_message,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_list_threads",
            "List email threads (conversations) in the user's mailbox.",
        )
        .tags(&["thread", "read"])
        .read_only(true),
        list_threads,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_get_thread",
            "Get a specific thread (conversation) by ID with all its messages.",
        )
        .tags(&["thread", "read"])
        .read_only(true),
        get_thread,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_trash_thread", "Move an entire thread to trash.")
            .tags(&["thread", "write"]),
        trash_thread,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_list_labels",
            "List all labels in the user's mailbox including system labels (INBOX, SENT, etc.) \
             and user-created labels.",
        )
        .tags(&["label", "read"])
        .read_only(true),
        list_labels,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_get_label", "Get details about a specific label by ID.")
            .tags(&["label", "read"])
            .read_only(true),
        get_label,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_create_label", "Create a new user label.").tags(&["label", "write"]),
        create_label,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_update_label",
            "Rename a user label or change its visibility. Blank fields are left unchanged.",
        )
        .tags(&["label", "write"]),
        update_label,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_delete_label",
            "Delete a user-created label. System labels cannot be deleted.",
        )
        .tags(&["label", "write"]),
        delete_label,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_list_drafts", "List draft emails.")
            .tags(&["draft", "read"])
            .read_only(true),
        list_drafts,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_get_draft", "Get a specific draft by ID.")
            .tags(&["draft", "read"])
            .read_only(true),
        get_draft,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_create_draft", "Create a new draft email.").tags(&["draft", "write"]),
        create_draft,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_update_draft",
            "Replace the contents of an existing draft.",
        )
        .tags(&["draft", "write"]),
        update_draft,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_send_draft", "Send a draft email.").tags(&["draft", "write"]),
        send_draft,
    )?;
    catalog.register_tool(
        ToolMeta::new("gmail_delete_draft", "Delete a draft.").tags(&["draft", "write"]),
        delete_draft,
    )?;
    catalog.register_tool(
        ToolMeta::new(
            "gmail_get_profile",
            "Get the current user's Gmail profile including email address and message/thread counts.",
        )
        .tags(&["profile", "read"])
        .read_only(true),
        get_profile,
    )?;
    Ok(())
}

async fn send(ctx: &DispatchContext, request: HttpRequest) -> AppResult<ToolOutput> {
    ctx.dispatch(CONNECTION, request)
        .await
        .map(ToolOutput::Dispatched)
}

// Messages

async fn list_messages(ctx: DispatchContext, input: ListMessagesInput) -> AppResult<ToolOutput> {
    let mut query = QueryBuilder::new();
    query.push("maxResults", validate_max_results(input.max_results)?.to_string());
    query.push_nonempty("q", input.query.trim());
    for label in split_label_ids(&input.label_ids) {
        query.push("labelIds", label);
    }
    if input.include_spam_trash {
        query.push("includeSpamTrash", "true");
    }
    send(&ctx, HttpRequest::get(query.apply(&user_path("messages")))).await
}

async fn get_message(ctx: DispatchContext, input: GetMessageInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.message_id, "message_id")?;
    let mut query = QueryBuilder::new();
    query.push("format", input.format.as_str());
    let path = query.apply(&user_path(&format!("messages/{}", encode(id))));
    send(&ctx, HttpRequest::get(path)).await
}

async fn send_message(ctx: DispatchContext, input: ComposeInput) -> AppResult<ToolOutput> {
    let raw = encode_raw_message(&input)?;
    let request =
        HttpRequest::post(user_path("messages/send")).with_body(json!({ "raw": raw }));
    send(&ctx, request).await
}

async fn trash_message(ctx: DispatchContext, input: MessageIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.message_id, "message_id")?;
    let path = user_path(&format!("messages/{}/trash", encode(id)));
    send(&ctx, HttpRequest::post(path)).await
}

async fn untrash_message(ctx: DispatchContext, input: MessageIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.message_id, "message_id")?;
    let path = user_path(&format!("messages/{}/untrash", encode(id)));
    send(&ctx, HttpRequest::post(path)).await
}

async fn modify_message(ctx: DispatchContext, input: ModifyMessageInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.message_id, "message_id")?;
    let add = split_label_ids(&input.add_label_ids);
    let remove = split_label_ids(&input.remove_label_ids);

    let mut body = Map::new();
    if !add.is_empty() {
        body.insert("addLabelIds".to_owned(), json!(add));
    }
    if !remove.is_empty() {
        body.insert("removeLabelIds".to_owned(), json!(remove));
    }

    let path = user_path(&format!("messages/{}/modify", encode(id)));
    send(&ctx, HttpRequest::post(path).with_body(Value::Object(body))).await
}

// Threads

async fn list_threads(ctx: DispatchContext, input: ListThreadsInput) -> AppResult<ToolOutput> {
    let mut query = QueryBuilder::new();
    query.push("maxResults", validate_max_results(input.max_results)?.to_string());
    query.push_nonempty("q", input.query.trim());
    for label in split_label_ids(&input.label_ids) {
        query.push("labelIds", label);
    }
    send(&ctx, HttpRequest::get(query.apply(&user_path("threads")))).await
}

async fn get_thread(ctx: DispatchContext, input: GetThreadInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.thread_id, "thread_id")?;
    let mut query = QueryBuilder::new();
    query.push("format", input.format.as_str());
    let path = query.apply(&user_path(&format!("threads/{}", encode(id))));
    send(&ctx, HttpRequest::get(path)).await
}

async fn trash_thread(ctx: DispatchContext, input: ThreadIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.thread_id, "thread_id")?;
    let path = user_path(&format!("threads/{}/trash", encode(id)));
    send(&ctx, HttpRequest::post(path)).await
}

// Labels

async fn list_labels(ctx: DispatchContext, _input: NoInput) -> AppResult<ToolOutput> {
    send(&ctx, HttpRequest::get(user_path("labels"))).await
}

async fn get_label(ctx: DispatchContext, input: LabelIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.label_id, "label_id")?;
    send(&ctx, HttpRequest::get(user_path(&format!("labels/{}", encode(id))))).await
}

async fn create_label(ctx: DispatchContext, input: CreateLabelInput) -> AppResult<ToolOutput> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::invalid("name must not be empty"));
    }
    let label_list = one_of(
        input.label_list_visibility.trim(),
        "label_list_visibility",
        LABEL_LIST_VISIBILITY,
    )?;
    let message_list = one_of(
        input.message_list_visibility.trim(),
        "message_list_visibility",
        MESSAGE_LIST_VISIBILITY,
    )?;

    let body = json!({
        "name": name,
        "labelListVisibility": label_list,
        "messageListVisibility": message_list,
    });
    send(&ctx, HttpRequest::post(user_path("labels")).with_body(body)).await
}

async fn update_label(ctx: DispatchContext, input: UpdateLabelInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.label_id, "label_id")?;

    let mut body = Map::new();
    let name = input.name.trim();
    if !name.is_empty() {
        body.insert("name".to_owned(), json!(name));
    }
    let label_list = input.label_list_visibility.trim();
    if !label_list.is_empty() {
        let value = one_of(label_list, "label_list_visibility", LABEL_LIST_VISIBILITY)?;
        body.insert("labelListVisibility".to_owned(), json!(value));
    }
    let message_list = input.message_list_visibility.trim();
    if !message_list.is_empty() {
        let value = one_of(message_list, "message_list_visibility", MESSAGE_LIST_VISIBILITY)?;
        body.insert("messageListVisibility".to_owned(), json!(value));
    }
    if body.is_empty() {
        return Err(AppError::invalid(
            "at least one of name, label_list_visibility, message_list_visibility is required",
        ));
    }

    let path = user_path(&format!("labels/{}", encode(id)));
    let request = HttpRequest::new(HttpMethod::Patch, path).with_body(Value::Object(body));
    send(&ctx, request).await
}

async fn delete_label(ctx: DispatchContext, input: LabelIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.label_id, "label_id")?;
    send(&ctx, HttpRequest::delete(user_path(&format!("labels/{}", encode(id))))).await
}

// Drafts

async fn list_drafts(ctx: DispatchContext, input: ListDraftsInput) -> AppResult<ToolOutput> {
    let mut query = QueryBuilder::new();
    query.push("maxResults", validate_max_results(input.max_results)?.to_string());
    send(&ctx, HttpRequest::get(query.apply(&user_path("drafts")))).await
}

async fn get_draft(ctx: DispatchContext, input: GetDraftInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.draft_id, "draft_id")?;
    let mut query = QueryBuilder::new();
    query.push("format", input.format.as_str());
    let path = query.apply(&user_path(&format!("drafts/{}", encode(id))));
    send(&ctx, HttpRequest::get(path)).await
}

async fn create_draft(ctx: DispatchContext, input: ComposeInput) -> AppResult<ToolOutput> {
    let raw = encode_raw_message(&input)?;
    let request =
        HttpRequest::post(user_path("drafts")).with_body(json!({ "message": { "raw": raw } }));
    send(&ctx, request).await
}

async fn update_draft(ctx: DispatchContext, input: UpdateDraftInput) -> AppResult<ToolOutput> {
    let (draft_id, compose) = input.into_parts();
    let id = validate_id(&draft_id, "draft_id")?;
    let raw = encode_raw_message(&compose)?;
    let path = user_path(&format!("drafts/{}", encode(id)));
    let request = HttpRequest::new(HttpMethod::Put, path)
        .with_body(json!({ "id": id, "message": { "raw": raw } }));
    send(&ctx, request).await
}

async fn send_draft(ctx: DispatchContext, input: DraftIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.draft_id, "draft_id")?;
    let request = HttpRequest::post(user_path("drafts/send")).with_body(json!({ "id": id }));
    send(&ctx, request).await
}

async fn delete_draft(ctx: DispatchContext, input: DraftIdInput) -> AppResult<ToolOutput> {
    let id = validate_id(&input.draft_id, "draft_id")?;
    send(&ctx, HttpRequest::delete(user_path(&format!("drafts/{}", encode(id))))).await
}

// Profile

async fn get_profile(ctx: DispatchContext, _input: NoInput) -> AppResult<ToolOutput> {
    send(&ctx, HttpRequest::get(user_path("profile"))).await
}

fn user_path(suffix: &str) -> String {
    format!("{USER_ROOT}/{suffix}")
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Ordered `key=value` pairs, percent-encoded on render
#[derive(Debug, Default)]
struct QueryBuilder {
    pairs: Vec<(&'static str, String)>,
}

impl QueryBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, key: &'static str, value: impl Into<String>) {
        self.pairs.push((key, value.into()));
    }

    fn push_nonempty(&mut self, key: &'static str, value: &str) {
        if !value.is_empty() {
            self.push(key, value);
        }
    }

    /// `path` with the query string appended, if any
    fn apply(&self, path: &str) -> String {
        if self.pairs.is_empty() {
            return path.to_owned();
        }
        let query = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{query}")
    }
}

/// Split a comma-separated label list, dropping blanks
fn split_label_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn validate_max_results(value: u32) -> AppResult<u32> {
    if value == 0 || value > MAX_RESULTS_CAP {
        return Err(AppError::InvalidInput(format!(
            "max_results must be in 1..={MAX_RESULTS_CAP}"
        )));
    }
    Ok(value)
}

/// Trimmed identifier; non-empty and free of control characters
fn validate_id<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} must not be empty")));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(trimmed)
}

fn one_of<'a>(value: &'a str, field: &str, allowed: &[&str]) -> AppResult<&'a str> {
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(AppError::InvalidInput(format!(
            "{field} must be one of: {}",
            allowed.join(", ")
        )))
    }
}
