use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{error, info, warn};

use crate::broadcast::{ChatRegistry, TipSender};
use crate::menu::{self, MenuAction, MenuReply};
use crate::responder::{Responder, ANALYSIS_UNAVAILABLE};
use crate::tips::Tips;

/// Shared application state
pub struct AppState {
    pub responder: Responder,
    pub tips: Tips,
    pub registry: Arc<ChatRegistry>,
}

impl AppState {
    pub fn new(responder: Responder, tips: Tips, registry: Arc<ChatRegistry>) -> Self {
        Self {
            responder,
            tips,
            registry,
        }
    }
}

/// Slash commands the bot answers; anything else is treated as a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Tip,
    Premium,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        // "/start@SecurityGuardBot args" -> "/start"
        let word = text.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "/start" => Some(Command::Start),
            "/tip" => Some(Command::Tip),
            "/premium" => Some(Command::Premium),
            _ => None,
        }
    }
}

/// Start the Telegram bot
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting Telegram bot...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    if state.registry.register(chat_id).await {
        info!(
            "New chat registered: {} ({} known)",
            chat_id,
            state.registry.len().await
        );
    }

    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    if text.starts_with('/') {
        match Command::parse(text) {
            Some(Command::Start) => {
                send_markdown(&bot, chat_id, menu::WELCOME_TEXT, Some(menu::main_menu())).await?;
            }
            Some(Command::Tip) => {
                let reply = MenuAction::DailyTip.respond(&state.tips);
                send_markdown(&bot, chat_id, reply.text(), None).await?;
            }
            Some(Command::Premium) => {
                let reply = MenuAction::Premium.respond(&state.tips);
                send_markdown(&bot, chat_id, reply.text(), None).await?;
            }
            None => info!("Ignoring unknown command in chat {}: {}", chat_id, text),
        }
        return Ok(());
    }

    info!("Message from chat {}: {}", chat_id, text);

    bot.send_chat_action(chat_id, teloxide::types::ChatAction::Typing)
        .await
        .ok();

    match state.responder.classify_and_reply(text).await {
        Ok(reply) => send_markdown(&bot, chat_id, &reply, None).await?,
        Err(e) => {
            error!("Security analysis failed for chat {}: {:#}", chat_id, e);
            bot.send_message(chat_id, ANALYSIS_UNAVAILABLE).await?;
        }
    }

    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    // Always answer, so the client stops showing a spinner on the button.
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    state.registry.register(chat_id).await;

    let data = q.data.as_deref().unwrap_or_default();
    let action = match data.parse::<MenuAction>() {
        Ok(action) => action,
        Err(e) => {
            warn!("Ignoring callback from chat {}: {}", chat_id, e);
            return Ok(());
        }
    };

    info!("Menu action {:?} from chat {}", action, chat_id);

    match action.respond(&state.tips) {
        MenuReply::Send(text) => send_markdown(&bot, chat_id, &text, None).await?,
        MenuReply::Edit(text) => {
            bot.edit_message_text(chat_id, message.id(), text)
                .parse_mode(markdown())
                .await?;
        }
    }

    Ok(())
}

#[allow(deprecated)]
fn markdown() -> ParseMode {
    ParseMode::Markdown
}

/// Send Markdown text; if Telegram cannot parse the entities (usually
/// unbalanced `*` or `_` in model output), resend it as plain text.
async fn send_markdown(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, text).parse_mode(markdown());
    if let Some(kb) = keyboard.clone() {
        request = request.reply_markup(kb);
    }

    match request.await {
        Ok(_) => Ok(()),
        Err(RequestError::Api(ApiError::CantParseEntities(reason))) => {
            warn!(
                "Markdown rejected for chat {} ({}), sending as plain text",
                chat_id, reason
            );
            let mut plain = bot.send_message(chat_id, text);
            if let Some(kb) = keyboard {
                plain = plain.reply_markup(kb);
            }
            plain.await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl TipSender for Bot {
    async fn send_tip(&self, chat_id: ChatId, text: &str) -> Result<()> {
        send_markdown(self, chat_id, text, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::QueryAnalyzer;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, method, path_regex};
    use wiremock::{Match, Mock, MockServer, ResponseTemplate};

    struct FailingAnalyzer;

    #[async_trait]
    impl QueryAnalyzer for FailingAnalyzer {
        async fn analyze(&self, _query: &str) -> Result<String> {
            anyhow::bail!("API error (500 Internal Server Error)")
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Responder::new(Arc::new(FailingAnalyzer)),
            Tips::default(),
            Arc::new(ChatRegistry::new()),
        ))
    }

    fn message_json(chat_id: i64, text: &str) -> Value {
        json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": { "id": chat_id, "type": "private", "first_name": "Ann" },
            "from": { "id": chat_id, "is_bot": false, "first_name": "Ann" },
            "text": text
        })
    }

    fn message(chat_id: i64, text: &str) -> Message {
        serde_json::from_value(message_json(chat_id, text)).unwrap()
    }

    fn callback(chat_id: i64, data: &str) -> CallbackQuery {
        serde_json::from_value(json!({
            "id": "cb-1",
            "from": { "id": chat_id, "is_bot": false, "first_name": "Ann" },
            "chat_instance": "ci-1",
            "data": data,
            "message": message_json(chat_id, "menu")
        }))
        .unwrap()
    }

    /// Telegram method names are case-insensitive; teloxide posts `/bot<token>/SendMessage`.
    fn api(name: &str) -> impl Match {
        path_regex(format!("(?i)/bot[^/]+/{}$", name))
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
    }

    async fn telegram_server() -> MockServer {
        let server = MockServer::start().await;
        let msg = message_json(42, "sent");
        for (name, result) in [
            ("sendMessage", msg.clone()),
            ("editMessageText", msg),
            ("sendChatAction", json!(true)),
            ("answerCallbackQuery", json!(true)),
        ] {
            Mock::given(method("POST"))
                .and(api(name))
                .respond_with(ok(result))
                .mount(&server)
                .await;
        }
        server
    }

    fn bot_for(server: &MockServer) -> Bot {
        Bot::new("123:test").set_api_url(server.uri().parse().unwrap())
    }

    /// (lower-cased method name, JSON body) for every request, in order.
    async fn calls(server: &MockServer) -> Vec<(String, Value)> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|req| {
                let name = req
                    .url
                    .path()
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                (name, req.body_json::<Value>().unwrap_or(Value::Null))
            })
            .collect()
    }

    fn sends(calls: &[(String, Value)]) -> Vec<&Value> {
        calls
            .iter()
            .filter(|(name, _)| name == "sendmessage")
            .map(|(_, body)| body)
            .collect()
    }

    #[tokio::test]
    async fn test_analysis_failure_sends_apology_and_registers_chat() {
        let server = telegram_server().await;
        let state = state();

        handle_message(bot_for(&server), message(42, "hello"), Arc::clone(&state))
            .await
            .unwrap();

        let calls = calls(&server).await;
        assert_eq!(calls[0].0, "sendchataction");
        assert_eq!(calls[0].1["action"], "typing");
        let sends = sends(&calls);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0]["chat_id"], 42);
        assert_eq!(sends[0]["text"], ANALYSIS_UNAVAILABLE);
        assert_eq!(state.registry.snapshot().await, vec![ChatId(42)]);
    }

    #[tokio::test]
    async fn test_wifi_question_gets_markdown_checklist() {
        let server = telegram_server().await;

        handle_message(bot_for(&server), message(42, "Is my wifi secure?"), state())
            .await
            .unwrap();

        let calls = calls(&server).await;
        let sends = sends(&calls);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0]["text"], crate::responder::WIFI_CHECKLIST);
        assert_eq!(sends[0]["parse_mode"], "Markdown");
    }

    #[tokio::test]
    async fn test_start_sends_welcome_with_keyboard() {
        let server = telegram_server().await;

        handle_message(bot_for(&server), message(42, "/start"), state())
            .await
            .unwrap();

        let calls = calls(&server).await;
        assert_eq!(calls.len(), 1);
        let body = &calls[0].1;
        assert_eq!(body["text"], menu::WELCOME_TEXT);
        let rows = body["reply_markup"]["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0]["callback_data"], "daily_tip");
    }

    #[tokio::test]
    async fn test_unparsable_markdown_is_resent_as_plain_text() {
        let server = telegram_server().await;
        Mock::given(method("POST"))
            .and(api("sendMessage"))
            .and(body_partial_json(json!({ "parse_mode": "Markdown" })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 2"
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        send_markdown(&bot_for(&server), ChatId(42), "a *b", None)
            .await
            .unwrap();

        let calls = calls(&server).await;
        let sends = sends(&calls);
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0]["parse_mode"], "Markdown");
        assert!(sends[1].get("parse_mode").is_none());
        assert_eq!(sends[1]["text"], "a *b");
    }

    #[tokio::test]
    async fn test_bot_delivers_daily_tip_as_markdown() {
        let server = telegram_server().await;

        bot_for(&server)
            .send_tip(ChatId(-100), "⏰ *Daily Security Tip:*\n\ntip")
            .await
            .unwrap();

        let calls = calls(&server).await;
        let sends = sends(&calls);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0]["chat_id"], -100);
        assert_eq!(sends[0]["parse_mode"], "Markdown");
    }

    #[tokio::test]
    async fn test_premium_callback_answers_then_edits() {
        let server = telegram_server().await;
        let state = state();

        handle_callback(bot_for(&server), callback(42, "premium"), Arc::clone(&state))
            .await
            .unwrap();

        let calls = calls(&server).await;
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["answercallbackquery", "editmessagetext"]);
        assert_eq!(calls[0].1["callback_query_id"], "cb-1");
        assert_eq!(calls[1].1["text"], menu::PREMIUM_TEXT);
        assert_eq!(calls[1].1["message_id"], 7);
        assert_eq!(state.registry.snapshot().await, vec![ChatId(42)]);
    }

    #[tokio::test]
    async fn test_daily_tip_callback_sends_new_message() {
        let server = telegram_server().await;

        handle_callback(bot_for(&server), callback(42, "daily_tip"), state())
            .await
            .unwrap();

        let calls = calls(&server).await;
        assert_eq!(calls[0].0, "answercallbackquery");
        let sends = sends(&calls);
        assert_eq!(sends.len(), 1);
        let text = sends[0]["text"].as_str().unwrap();
        assert!(text.starts_with("🔒 *Security Tip of the Day:*"));
    }

    #[tokio::test]
    async fn test_unknown_callback_is_only_answered() {
        let server = telegram_server().await;
        let state = state();

        handle_callback(bot_for(&server), callback(42, "bogus"), Arc::clone(&state))
            .await
            .unwrap();

        let calls = calls(&server).await;
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["answercallbackquery"]);
        assert_eq!(state.registry.len().await, 1);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/start@SecurityGuardBot"), Some(Command::Start));
        assert_eq!(Command::parse("/tip please"), Some(Command::Tip));
        assert_eq!(Command::parse("/premium"), Some(Command::Premium));
        assert_eq!(Command::parse("/clear"), None);
        assert_eq!(Command::parse("/"), None);
    }
}
