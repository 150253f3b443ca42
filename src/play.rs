use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use teloxide::{
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, ParseMode},
    utils::html,
};
use tokio::sync::Mutex;

use crate::quiz::ai_helper::{ask_expert, ExpertOutcome};
use crate::quiz::bank::QuestionSource;
use crate::quiz::leaderboard::ScoreSink;
use crate::quiz::prizes::{format_prize, PrizeLadder};
use crate::quiz::round::{
    Assistance, Evaluation, GameRound, Progress, RoundError, ScoreRecord, SkipOutcome,
};
use crate::quiz::OptionLetter;
use crate::{show_menu, App, HandlerResult, QuizDialogue, State};

const FIFTY_FIFTY: &str = "50:50";
const ASK_EXPERT: &str = "Hỏi Chuyên gia";
const SKIP: &str = "Bỏ qua";
const STOP: &str = "Dừng cuộc chơi";
const CONFIRM_STOP: &str = "Dừng lại";
const KEEP_PLAYING: &str = "Tiếp tục chơi";

const REVEAL_IN_PROGRESS: &str = "Đang công bố đáp án, vui lòng chờ câu tiếp theo.";
const HIDDEN_OPTION: &str = "Phương án này đã bị loại bởi 50:50, hãy chọn phương án khác.";
const LIFELINE_SPENT_FIFTY: &str = "Bạn đã dùng quyền 50:50.";
const LIFELINE_SPENT_EXPERT: &str = "Bạn đã dùng quyền Hỏi Chuyên gia.";
const LIFELINE_SPENT_SKIP: &str = "Bạn đã dùng quyền Bỏ qua.";

/// Pause between revealing an answer and moving on.
const REVEAL_DELAY: Duration = Duration::from_secs(2);
const HURRY_UP_AT: u32 = 10;

type SharedRound = Arc<Mutex<GameRound>>;

/// Rounds in progress, one per chat.
#[derive(Default)]
pub struct RoundRegistry {
    rounds: Mutex<HashMap<ChatId, SharedRound>>,
}

impl RoundRegistry {
    pub async fn insert(&self, chat_id: ChatId, round: SharedRound) {
        self.rounds.lock().await.insert(chat_id, round);
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<SharedRound> {
        self.rounds.lock().await.get(&chat_id).cloned()
    }

    pub async fn remove(&self, chat_id: ChatId) -> Option<SharedRound> {
        self.rounds.lock().await.remove(&chat_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Answer(usize),
    FiftyFifty,
    AskExpert,
    Skip,
    RequestStop,
    ConfirmStop,
    KeepPlaying,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            FIFTY_FIFTY => Some(Command::FiftyFifty),
            ASK_EXPERT => Some(Command::AskExpert),
            SKIP => Some(Command::Skip),
            STOP => Some(Command::RequestStop),
            CONFIRM_STOP => Some(Command::ConfirmStop),
            KEEP_PLAYING => Some(Command::KeepPlaying),
            other => {
                // Answer buttons read "A. option text"; a bare letter works too.
                let letter = other.split('.').next().unwrap_or_default();
                OptionLetter::parse(letter).map(|l| Command::Answer(l.index()))
            }
        }
    }
}

pub async fn start_round(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    app: Arc<App>,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    let ladder = PrizeLadder::default();
    let questions = {
        let bank = app.bank.read().await;
        bank.draw_round(ladder.len(), &mut StdRng::from_entropy())
    };

    let round = match GameRound::new(
        player.clone(),
        questions,
        ladder,
        app.config.seconds_per_question,
    ) {
        Ok(round) => round,
        Err(err) => {
            warn!("Could not start a round for {}: {}", player, err);
            show_menu(&bot, chat_id, &round_error_text(&err)).await?;
            return Ok(());
        }
    };
    info!(
        "{} starts a round of {} questions",
        player,
        round.question_count()
    );

    let round = Arc::new(Mutex::new(round));
    app.rounds.insert(chat_id, round.clone()).await;
    dialogue.update(State::Playing { player }).await?;

    send_question(&bot, chat_id, &round).await?;
    tokio::spawn(run_clock(bot, dialogue, round, app));
    Ok(())
}

/// Drives both clocks once a second until the round ends.
async fn run_clock(bot: Bot, dialogue: QuizDialogue, round: SharedRound, app: Arc<App>) {
    let chat_id = dialogue.chat_id();
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // the first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let (timed_out, hurry) = {
            let mut round = round.lock().await;
            if round.is_terminal() {
                break;
            }
            round.advance_clock();
            let timed_out = round.tick();
            let hurry = round.is_awaiting_answer() && round.countdown() == HURRY_UP_AT;
            (timed_out, hurry)
        };

        let result = match timed_out {
            Some(evaluation) => {
                settle(&bot, &dialogue, &round, &app, evaluation).await
            }
            None if hurry => bot
                .send_message(chat_id, format!("⏱ Còn {} giây!", HURRY_UP_AT))
                .await
                .map(|_| ())
                .map_err(Into::into),
            None => Ok(()),
        };
        if let Err(err) = result {
            error!("Round clock for {} failed: {}", chat_id, err);
        }
    }
    debug!("Round clock for {} stopped", chat_id);
}

pub async fn playing(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    app: Arc<App>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let round = match app.rounds.get(chat_id).await {
        Some(round) => round,
        None => {
            dialogue.update(State::ReceiveMenuChoice { player }).await?;
            show_menu(&bot, chat_id, "Không có lượt chơi nào đang diễn ra.").await?;
            return Ok(());
        }
    };

    let command = match msg.text().and_then(Command::parse) {
        Some(command) => command,
        None => {
            bot.send_message(chat_id, "Hãy chọn một đáp án hoặc quyền trợ giúp.")
                .await?;
            return Ok(());
        }
    };

    match command {
        Command::Answer(index) => {
            let evaluation = round.lock().await.submit_answer(Some(index));
            match evaluation {
                Some(evaluation) => settle(&bot, &dialogue, &round, &app, evaluation).await?,
                None => refuse(&bot, chat_id, &round, command).await?,
            }
        }
        Command::FiftyFifty => {
            let used = round
                .lock()
                .await
                .use_fifty_fifty(&mut StdRng::from_entropy());
            if used {
                bot.send_message(chat_id, "50:50: hai phương án sai đã bị loại.")
                    .await?;
                send_question(&bot, chat_id, &round).await?;
            } else {
                refuse(&bot, chat_id, &round, command).await?;
            }
        }
        Command::AskExpert => {
            tokio::spawn(consult_expert(bot, chat_id, round, app));
        }
        Command::Skip => {
            let outcome = round.lock().await.use_skip();
            match outcome {
                Some(SkipOutcome::Skipped(_)) => {
                    bot.send_message(chat_id, "Bạn đã bỏ qua câu hỏi này.").await?;
                    send_question(&bot, chat_id, &round).await?;
                }
                Some(SkipOutcome::Stopped(record)) => {
                    bot.send_message(
                        chat_id,
                        "Không thể bỏ qua câu hỏi cuối cùng, cuộc chơi dừng tại đây.",
                    )
                    .await?;
                    finish_round(&bot, &dialogue, &app, record).await?;
                }
                None => refuse(&bot, chat_id, &round, command).await?,
            }
        }
        Command::RequestStop => {
            let (awaiting, banked) = {
                let round = round.lock().await;
                (round.is_awaiting_answer(), round.banked_prize())
            };
            if awaiting {
                bot.send_message(
                    chat_id,
                    format!(
                        "Bạn có chắc chắn muốn dừng cuộc chơi? Bạn sẽ ra về với số điểm của câu hỏi cuối cùng đã trả lời đúng.\n\nĐiểm hiện tại: <b>{}</b>",
                        format_prize(banked)
                    ),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(KeyboardMarkup::new(vec![vec![
                    KeyboardButton::new(KEEP_PLAYING),
                    KeyboardButton::new(CONFIRM_STOP),
                ]]))
                .await?;
            } else {
                refuse(&bot, chat_id, &round, command).await?;
            }
        }
        Command::ConfirmStop => {
            let record = round.lock().await.stop();
            match record {
                Some(record) => finish_round(&bot, &dialogue, &app, record).await?,
                None => refuse(&bot, chat_id, &round, command).await?,
            }
        }
        Command::KeepPlaying => {
            send_question(&bot, chat_id, &round).await?;
        }
    }
    Ok(())
}

async fn consult_expert(bot: Bot, chat_id: ChatId, round: SharedRound, app: Arc<App>) {
    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!("Typing indicator for {} failed: {}", chat_id, err);
    }

    let reply = match ask_expert(&round, app.expert.as_ref()).await {
        ExpertOutcome::Applied(Some(suggestion)) => format!(
            "🧪 Chuyên gia Hóa học gợi ý: <b>Đáp án {}</b> (độ chắc chắn {}%)",
            suggestion.option, suggestion.confidence
        ),
        ExpertOutcome::Applied(None) => {
            "🧪 Chuyên gia chưa thể đưa ra gợi ý cho câu này.".to_string()
        }
        ExpertOutcome::Spent => LIFELINE_SPENT_EXPERT.to_string(),
        ExpertOutcome::Busy => REVEAL_IN_PROGRESS.to_string(),
        ExpertOutcome::Discarded => {
            debug!("Expert answered too late for {}", chat_id);
            return;
        }
    };
    if let Err(err) = bot
        .send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await
    {
        error!("Could not deliver expert reply to {}: {}", chat_id, err);
    }
}

/// Why a command had no effect on the round.
fn refusal_text(round: &GameRound, command: Command) -> &'static str {
    if !round.is_awaiting_answer() {
        return REVEAL_IN_PROGRESS;
    }
    let lifelines = round.lifelines();
    match command {
        Command::Answer(index) if round.hidden_options().contains(&index) => HIDDEN_OPTION,
        Command::FiftyFifty if !lifelines.fifty_fifty => LIFELINE_SPENT_FIFTY,
        Command::AskExpert if !lifelines.ask_expert => LIFELINE_SPENT_EXPERT,
        Command::Skip if !lifelines.skip => LIFELINE_SPENT_SKIP,
        _ => "Thao tác này chưa thể thực hiện lúc này.",
    }
}

async fn refuse(bot: &Bot, chat_id: ChatId, round: &SharedRound, command: Command) -> HandlerResult {
    let text = refusal_text(&*round.lock().await, command);
    bot.send_message(chat_id, text).await?;
    Ok(())
}

fn round_error_text(err: &RoundError) -> String {
    match err {
        RoundError::NoQuestions => "Ngân hàng câu hỏi đang trống, chưa thể bắt đầu.".to_string(),
        other => format!(
            "Không thể bắt đầu lượt chơi: {}",
            html::escape(&other.to_string())
        ),
    }
}

/// Reveals the evaluation, waits a moment, then moves the round on.
async fn settle(
    bot: &Bot,
    dialogue: &QuizDialogue,
    round: &SharedRound,
    app: &Arc<App>,
    evaluation: Evaluation,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    bot.send_message(chat_id, evaluation_text(&evaluation))
        .parse_mode(ParseMode::Html)
        .await?;
    tokio::time::sleep(REVEAL_DELAY).await;

    let progress = round.lock().await.proceed();
    match progress {
        Some(Progress::Next(_)) => send_question(bot, chat_id, round).await,
        Some(Progress::Finished(record)) => finish_round(bot, dialogue, app, record).await,
        None => Ok(()),
    }
}

async fn finish_round(
    bot: &Bot,
    dialogue: &QuizDialogue,
    app: &Arc<App>,
    record: ScoreRecord,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    app.rounds.remove(chat_id).await;

    let board = app.clone();
    let score = record.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || board.leaderboard.record(&score)).await {
        error!("Recording the score for {} panicked: {}", record.name, err);
    }

    let top_prize = PrizeLadder::default().top_prize();
    dialogue
        .update(State::ReceiveMenuChoice {
            player: record.name.clone(),
        })
        .await?;
    show_menu(bot, chat_id, &game_over_text(&record, top_prize)).await
}

async fn send_question(bot: &Bot, chat_id: ChatId, round: &SharedRound) -> HandlerResult {
    let (text, rows) = {
        let round = round.lock().await;
        if !round.is_awaiting_answer() {
            return Ok(());
        }
        (question_text(&round), keyboard_rows(&round))
    };

    let keyboard = KeyboardMarkup::new(
        rows.into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    );
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

fn question_text(round: &GameRound) -> String {
    let question = round.current_question();
    let index = round.current_index();
    let prize = round.ladder().tier(index).unwrap_or_default();

    let mut text = format!(
        "<b>Câu {}/{}</b> · {} điểm · ⏱ {}s\n\n<b>{}</b>\n",
        index + 1,
        round.question_count(),
        format_prize(prize),
        round.countdown(),
        html::escape(&question.question)
    );
    for (i, option) in question.options.iter().enumerate() {
        if round.hidden_options().contains(&i) {
            continue;
        }
        if let Some(letter) = OptionLetter::from_index(i) {
            text.push_str(&format!("\n{}. {}", letter, html::escape(option)));
        }
    }
    if let Some(topic) = &question.topic {
        text.push_str(&format!("\n\n<i>Chủ đề: {}</i>", html::escape(topic)));
    }
    match round.assistance() {
        Assistance::Pending { .. } => text.push_str("\n\n🧪 Chuyên gia đang suy nghĩ..."),
        Assistance::Ready(s) => text.push_str(&format!(
            "\n\n🧪 Chuyên gia Hóa học gợi ý: <b>Đáp án {}</b> (độ chắc chắn {}%)",
            s.option, s.confidence
        )),
        Assistance::None => {}
    }
    text.push_str(&format!(
        "\n\n<b>Thang điểm</b>\n{}",
        round.ladder().render(index)
    ));
    text
}

fn keyboard_rows(round: &GameRound) -> Vec<Vec<String>> {
    let question = round.current_question();
    let answers: Vec<String> = question
        .options
        .iter()
        .enumerate()
        .filter(|(i, _)| !round.hidden_options().contains(i))
        .filter_map(|(i, option)| {
            OptionLetter::from_index(i).map(|letter| format!("{}. {}", letter, option))
        })
        .collect();

    let mut rows: Vec<Vec<String>> = answers.chunks(2).map(|pair| pair.to_vec()).collect();

    let lifelines = round.lifelines();
    let available: Vec<String> = [
        (lifelines.fifty_fifty, FIFTY_FIFTY),
        (lifelines.ask_expert, ASK_EXPERT),
        (lifelines.skip, SKIP),
    ]
    .iter()
    .filter(|(available, _)| *available)
    .map(|(_, label)| label.to_string())
    .collect();
    if !available.is_empty() {
        rows.push(available);
    }
    rows.push(vec![STOP.to_string()]);
    rows
}

fn evaluation_text(evaluation: &Evaluation) -> String {
    let correct = OptionLetter::from_index(evaluation.correct_option)
        .map(|l| l.to_string())
        .unwrap_or_default();
    if evaluation.correct {
        "✅ Chính xác!".to_string()
    } else if evaluation.timed_out() {
        format!("⌛ Hết giờ! Đáp án đúng là <b>{}</b>.", correct)
    } else {
        format!("❌ Sai rồi! Đáp án đúng là <b>{}</b>.", correct)
    }
}

fn game_over_text(record: &ScoreRecord, top_prize: u64) -> String {
    let name = html::escape(&record.name);
    if record.score == top_prize {
        return format!(
            "🏅 <b>CHỨNG NHẬN</b>\n\n<b>THIÊN TÀI HÓA HỌC</b>\n\nTrân trọng trao cho <b>{}</b>\n\
             Đã xuất sắc vượt qua {} câu hỏi của chương trình \"Ai là thiên tài\" và giành được giải thưởng cao nhất: <b>{}</b> điểm.\n\
             Thời gian: {} giây.",
            name,
            record.question,
            format_prize(record.score),
            record.time
        );
    }
    format!(
        "Trò chơi kết thúc!\n\n<b>{}</b>, bạn ra về với <b>{}</b> điểm.\nSố câu trả lời đúng: {}\nThời gian: {} giây\n\nĐiểm của bạn đã được lưu vào bảng xếp hạng.",
        name,
        format_prize(record.score),
        record.question,
        record.time
    )
}
