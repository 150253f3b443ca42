use std::sync::Arc;

use log::info;
use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode},
    utils::html,
};

use crate::quiz::bank::{BankError, QuestionBank};
use crate::quiz::import::{self, ImportError};
use crate::quiz::Question;
use crate::{show_menu, App, HandlerResult, QuizDialogue, State};

const LIST_QUESTIONS: &str = "Danh sách câu hỏi";
const BULK_ADD: &str = "Thêm hàng loạt";
const IMPORT_CSV: &str = "Nhập CSV";
const EXPORT_CSV: &str = "Xuất CSV";
const EDIT_QUESTION: &str = "Sửa câu hỏi";
const DELETE_QUESTION: &str = "Xóa câu hỏi";
const BACK: &str = "Quay lại";

/// Telegram rejects messages over 4096 characters.
const MESSAGE_LIMIT: usize = 3500;

const BULK_HELP: &str = "Dán câu hỏi theo định dạng:\n\n\
Chủ đề: Hóa học hữu cơ\n\
Câu hỏi: Chất nào sau đây là một anken?\n\
A. CH4\n\
B. C2H2\n\
C. C2H4\n\
D. C6H6\n\
ĐÁP ÁN ĐÚNG: C";

const CSV_HELP: &str = "Gửi file CSV (hoặc dán nội dung) với các cột: \
question,optionA,optionB,optionC,optionD,correctAnswerIndex,topic\n\
correctAnswerIndex tính từ 0 (0 = A).";

fn admin_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(LIST_QUESTIONS)],
        vec![KeyboardButton::new(BULK_ADD), KeyboardButton::new(IMPORT_CSV)],
        vec![KeyboardButton::new(EXPORT_CSV)],
        vec![
            KeyboardButton::new(EDIT_QUESTION),
            KeyboardButton::new(DELETE_QUESTION),
        ],
        vec![KeyboardButton::new(BACK)],
    ])
}

async fn show_admin_menu(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(admin_keyboard())
        .await?;
    Ok(())
}

async fn ask_for(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(KeyboardRemove::new())
        .await?;
    Ok(())
}

pub async fn receive_password(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    if msg.text().map(str::trim) == Some(app.config.admin_password.as_str()) {
        info!("{} opened the question editor", player);
        let count = app.bank.read().await.len();
        show_admin_menu(
            &bot,
            msg.chat.id,
            &format!("Quản lý câu hỏi: ngân hàng hiện có <b>{}</b> câu hỏi.", count),
        )
        .await?;
        dialogue.update(State::AdminMenu { player }).await?;
    } else {
        show_menu(&bot, msg.chat.id, "Mật khẩu không đúng!").await?;
        dialogue.update(State::ReceiveMenuChoice { player }).await?;
    }
    Ok(())
}

pub async fn receive_admin_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    match msg.text() {
        Some(LIST_QUESTIONS) => {
            let pages = {
                let bank = app.bank.read().await;
                paginate(&list_by_topic(&bank))
            };
            for page in pages {
                bot.send_message(chat_id, page)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            show_admin_menu(&bot, chat_id, "Bạn muốn làm gì tiếp?").await?;
        }
        Some(BULK_ADD) => {
            ask_for(&bot, chat_id, BULK_HELP).await?;
            dialogue.update(State::AdminReceiveBulk { player }).await?;
        }
        Some(IMPORT_CSV) => {
            ask_for(&bot, chat_id, CSV_HELP).await?;
            dialogue.update(State::AdminReceiveCsv { player }).await?;
        }
        Some(EXPORT_CSV) => {
            let csv = {
                let bank = app.bank.read().await;
                import::export_csv(bank.questions())?
            };
            bot.send_document(
                chat_id,
                InputFile::memory(csv).file_name("questions_export.csv"),
            )
            .await?;
        }
        Some(EDIT_QUESTION) => {
            ask_for(&bot, chat_id, "Nhập mã câu hỏi cần sửa.").await?;
            dialogue.update(State::AdminReceiveEditId { player }).await?;
        }
        Some(DELETE_QUESTION) => {
            ask_for(&bot, chat_id, "Nhập mã câu hỏi cần xóa.").await?;
            dialogue.update(State::AdminReceiveDelete { player }).await?;
        }
        Some(BACK) => {
            show_menu(&bot, chat_id, "Đã thoát khỏi trang quản lý.").await?;
            dialogue.update(State::ReceiveMenuChoice { player }).await?;
        }
        _ => show_admin_menu(&bot, chat_id, "Vui lòng chọn một trong các lựa chọn").await?,
    }
    Ok(())
}

pub async fn receive_bulk(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();
    let reply = add_questions(&app, import::parse_bulk(text)).await;
    show_admin_menu(&bot, msg.chat.id, &reply).await?;
    dialogue.update(State::AdminMenu { player }).await?;
    Ok(())
}

pub async fn receive_csv(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let text = match (msg.document(), msg.text()) {
        (Some(document), _) => {
            let file = bot.get_file(&document.file.id).await?;
            let mut bytes = Vec::new();
            bot.download_file(&file.path, &mut bytes).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        (None, Some(text)) => text.to_string(),
        (None, None) => {
            bot.send_message(msg.chat.id, CSV_HELP).await?;
            return Ok(());
        }
    };

    let reply = add_questions(&app, import::parse_csv(&text)).await;
    show_admin_menu(&bot, msg.chat.id, &reply).await?;
    dialogue.update(State::AdminMenu { player }).await?;
    Ok(())
}

pub async fn receive_delete(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let id = msg.text().map(str::trim).unwrap_or_default();
    let reply = {
        let mut bank = app.bank.write().await;
        match bank.remove(id) {
            Ok(removed) => match save_bank(&bank) {
                Ok(()) => format!("Đã xóa câu hỏi: {}", html::escape(&removed.question)),
                Err(err) => format!("Đã xóa nhưng không lưu được: {}", html::escape(&err.to_string())),
            },
            Err(err) => format!("Không xóa được: {}", html::escape(&err.to_string())),
        }
    };
    show_admin_menu(&bot, msg.chat.id, &reply).await?;
    dialogue.update(State::AdminMenu { player }).await?;
    Ok(())
}

pub async fn receive_edit_id(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let id = msg.text().map(str::trim).unwrap_or_default().to_string();
    let current = app.bank.read().await.get(&id).cloned();
    match current {
        Some(question) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Nội dung hiện tại, hãy gửi lại bản đã sửa theo cùng định dạng:\n\n{}",
                    import::format_bulk(&question)
                ),
            )
            .await?;
            dialogue.update(State::AdminReceiveEdit { player, id }).await?;
        }
        None => {
            show_admin_menu(
                &bot,
                msg.chat.id,
                &format!("Không có câu hỏi với mã {}", html::escape(&id)),
            )
            .await?;
            dialogue.update(State::AdminMenu { player }).await?;
        }
    }
    Ok(())
}

pub async fn receive_edit(
    bot: Bot,
    dialogue: QuizDialogue,
    (player, id): (String, String),
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let parsed = import::parse_bulk(msg.text().unwrap_or_default());
    let reply = match parsed {
        Ok(mut questions) if questions.len() == 1 => {
            let mut question = questions.remove(0);
            question.id = id;
            let mut bank = app.bank.write().await;
            match bank.update(question).and_then(|()| save_bank(&bank)) {
                Ok(()) => "Đã cập nhật câu hỏi.".to_string(),
                Err(err) => format!("Không cập nhật được: {}", html::escape(&err.to_string())),
            }
        }
        Ok(_) => "Vui lòng gửi đúng một câu hỏi.".to_string(),
        Err(err) => format!("Không đọc được câu hỏi: {}", html::escape(&err.to_string())),
    };
    show_admin_menu(&bot, msg.chat.id, &reply).await?;
    dialogue.update(State::AdminMenu { player }).await?;
    Ok(())
}

async fn add_questions(app: &App, parsed: Result<Vec<Question>, ImportError>) -> String {
    let questions = match parsed {
        Ok(questions) => questions,
        Err(err) => {
            return format!(
                "Đã xảy ra lỗi khi xử lý dữ liệu: {}",
                html::escape(&err.to_string())
            )
        }
    };

    let mut bank = app.bank.write().await;
    match bank.add_all(questions).and_then(|added| save_bank(&bank).map(|()| added)) {
        Ok(added) => {
            info!("Added {} questions, bank now holds {}", added, bank.len());
            format!("{} câu hỏi đã được thêm thành công!", added)
        }
        Err(err) => format!(
            "Đã xảy ra lỗi khi xử lý dữ liệu: {}",
            html::escape(&err.to_string())
        ),
    }
}

/// Moves the file write off the async worker; the write guard stays held so
/// saves land in order.
fn save_bank(bank: &QuestionBank) -> Result<(), BankError> {
    tokio::task::block_in_place(|| bank.save())
}

fn list_by_topic(bank: &QuestionBank) -> Vec<String> {
    let render = |question: &Question| {
        format!(
            "<code>{}</code> {} (<b>{}</b>)",
            html::escape(&question.id),
            html::escape(&question.question),
            question.correct_letter()
        )
    };

    let mut lines = Vec::new();
    for topic in bank.topics() {
        lines.push(format!("\n<b>{}</b>", html::escape(&topic)));
        lines.extend(bank.by_topic(&topic).map(|q| render(q)));
    }
    let untagged: Vec<String> = bank
        .questions()
        .iter()
        .filter(|q| q.topic.is_none())
        .map(|q| render(q))
        .collect();
    if !untagged.is_empty() {
        lines.push("\n<b>Chưa phân loại</b>".to_string());
        lines.extend(untagged);
    }
    lines
}

/// Splits lines into messages that fit Telegram's limit.
fn paginate(lines: &[String]) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();
    for line in lines {
        if !page.is_empty() && page.len() + line.len() + 1 > MESSAGE_LIMIT {
            pages.push(std::mem::take(&mut page));
        }
        if !page.is_empty() {
            page.push('\n');
        }
        page.push_str(line);
    }
    if !page.is_empty() {
        pages.push(page);
    }
    if pages.is_empty() {
        pages.push("Ngân hàng câu hỏi đang trống.".to_string());
    }
    pages
}
