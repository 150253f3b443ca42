mod admin;
mod config;
mod play;
mod quiz;

use std::sync::Arc;

use dotenv::dotenv;
use log::{info, warn};
use quiz::{
    ai_helper::{AssistanceProvider, ChemistryExpert, GuessingExpert},
    bank::QuestionBank,
    leaderboard::Leaderboard,
    prizes::{format_prize, PrizeLadder},
};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup, ParseMode},
    utils::html,
};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::play::RoundRegistry;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type UserInfoStorage = std::sync::Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveFullName,
    ReceiveMenuChoice {
        player: String,
    },
    Playing {
        player: String,
    },
    ReceiveAdminPassword {
        player: String,
    },
    AdminMenu {
        player: String,
    },
    AdminReceiveBulk {
        player: String,
    },
    AdminReceiveCsv {
        player: String,
    },
    AdminReceiveDelete {
        player: String,
    },
    AdminReceiveEditId {
        player: String,
    },
    AdminReceiveEdit {
        player: String,
        id: String,
    },
}

/// Everything the handlers share across chats.
pub struct App {
    pub config: Config,
    pub bank: RwLock<QuestionBank>,
    pub leaderboard: Leaderboard,
    pub expert: Box<dyn AssistanceProvider>,
    pub rounds: RoundRegistry,
}

#[tokio::main]
async fn main() -> HandlerResult {
    // A missing .env is fine; the variables may come from the environment.
    dotenv().ok();
    pretty_env_logger::init();
    info!("Starting Ai Là Thiên Tài bot...");

    let config = Config::from_env()?;
    let bot = Bot::from_env();

    info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: UserInfoStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await?
        .erase();

    let expert: Box<dyn AssistanceProvider> = match &config.chatgpt_api_key {
        Some(key) => match ChemistryExpert::new(key.clone()) {
            Ok(expert) => Box::new(expert),
            Err(err) => {
                warn!("Unable to set up ChatGPT ({}), the expert will guess", err);
                Box::new(GuessingExpert::new(None))
            }
        },
        None => {
            warn!("CHATGPT_API_KEY is not set, the expert will guess");
            Box::new(GuessingExpert::new(None))
        }
    };

    let app = Arc::new(App {
        bank: RwLock::new(QuestionBank::load(&config.questions_path)),
        leaderboard: Leaderboard::load(&config.leaderboard_path),
        expert,
        rounds: RoundRegistry::default(),
        config,
    });

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveFullName].endpoint(receive_full_name))
            .branch(dptree::case![State::ReceiveMenuChoice { player }].endpoint(receive_menu_choice))
            .branch(dptree::case![State::Playing { player }].endpoint(play::playing))
            .branch(
                dptree::case![State::ReceiveAdminPassword { player }]
                    .endpoint(admin::receive_password),
            )
            .branch(dptree::case![State::AdminMenu { player }].endpoint(admin::receive_admin_choice))
            .branch(dptree::case![State::AdminReceiveBulk { player }].endpoint(admin::receive_bulk))
            .branch(dptree::case![State::AdminReceiveCsv { player }].endpoint(admin::receive_csv))
            .branch(
                dptree::case![State::AdminReceiveDelete { player }].endpoint(admin::receive_delete),
            )
            .branch(
                dptree::case![State::AdminReceiveEditId { player }]
                    .endpoint(admin::receive_edit_id),
            )
            .branch(
                dptree::case![State::AdminReceiveEdit { player, id }].endpoint(admin::receive_edit),
            ),
    )
    .dependencies(dptree::deps![storage, app])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

fn greeting_text(questions: usize, seconds_per_question: u32) -> String {
    format!(
        "Chào mừng đến với <b>AI LÀ THIÊN TÀI</b> (Hóa học lớp 11)! \
         {} câu hỏi, {} giây mỗi câu và ba quyền trợ giúp: 50:50, Hỏi Chuyên gia và Bỏ qua. \
         Bạn tên là gì?",
        questions, seconds_per_question
    )
}

pub const PLAY_GAME: &str = "Bắt đầu chơi";
pub const SHOW_LEADERBOARD: &str = "Bảng xếp hạng";
pub const EXPORT_LEADERBOARD: &str = "Tải bảng xếp hạng (CSV)";
pub const OPEN_ADMIN: &str = "Quản lý câu hỏi";

pub fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(PLAY_GAME)],
        vec![
            KeyboardButton::new(SHOW_LEADERBOARD),
            KeyboardButton::new(EXPORT_LEADERBOARD),
        ],
        vec![KeyboardButton::new(OPEN_ADMIN)],
    ])
}

pub async fn show_menu(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(menu_keyboard())
        .await?;
    Ok(())
}

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message, app: Arc<App>) -> HandlerResult {
    let greeting = greeting_text(PrizeLadder::default().len(), app.config.seconds_per_question);
    bot.send_message(msg.chat.id, greeting)
        .parse_mode(ParseMode::Html)
        .await?;

    dialogue.update(State::ReceiveFullName).await?;
    Ok(())
}

async fn receive_full_name(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    let player = match msg.text().map(str::trim).filter(|t| !t.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            bot.send_message(msg.chat.id, "Vui lòng nhập tên của bạn (bằng chữ)")
                .await?;
            return Ok(());
        }
    };

    show_menu(
        &bot,
        msg.chat.id,
        &format!("Rất vui được gặp bạn, <b>{}</b>! Bạn muốn làm gì?", html::escape(&player)),
    )
    .await?;
    dialogue.update(State::ReceiveMenuChoice { player }).await?;
    Ok(())
}

async fn receive_menu_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    match msg.text() {
        Some(PLAY_GAME) => play::start_round(bot, dialogue, player, app).await,
        Some(SHOW_LEADERBOARD) => {
            let text = leaderboard_text(&app.leaderboard);
            show_menu(&bot, msg.chat.id, &text).await
        }
        Some(EXPORT_LEADERBOARD) => {
            let csv = app.leaderboard.export_csv()?;
            bot.send_document(
                msg.chat.id,
                InputFile::memory(csv).file_name("leaderboard.csv"),
            )
            .await?;
            Ok(())
        }
        Some(OPEN_ADMIN) => {
            bot.send_message(msg.chat.id, "Vui lòng nhập mật khẩu quản trị.")
                .reply_markup(teloxide::types::KeyboardRemove::new())
                .await?;
            dialogue
                .update(State::ReceiveAdminPassword { player })
                .await?;
            Ok(())
        }
        _ => show_menu(&bot, msg.chat.id, "Vui lòng chọn một trong các lựa chọn").await,
    }
}

fn leaderboard_text(leaderboard: &Leaderboard) -> String {
    let top = leaderboard.top(10);
    if top.is_empty() {
        return "Bảng xếp hạng còn trống. Hãy là người đầu tiên!".to_string();
    }
    let rows = top
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let medal = match i {
                0 => "🥇",
                1 => "🥈",
                2 => "🥉",
                _ => "  ",
            };
            format!(
                "{} {}. <b>{}</b> · {} điểm · {} câu · {}s",
                medal,
                i + 1,
                html::escape(&entry.name),
                format_prize(entry.score),
                entry.question,
                entry.time
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("<b>Bảng xếp hạng</b>\n\n{}", rows)
}
