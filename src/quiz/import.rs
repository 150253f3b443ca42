//! Getting questions in and out of the bank in bulk.

use std::io::Write;

use csv::{QuoteStyle, ReaderBuilder, Trim, WriterBuilder};

use crate::quiz::{OptionLetter, Question, OPTION_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("no valid questions found")]
    NoQuestions,
    #[error("line {0} is not a valid question")]
    InvalidLine(u64),
    #[error("line {0} needs at least 6 columns")]
    TooFewColumns(u64),
    #[error("CSV could not be read: {0}")]
    Csv(#[from] csv::Error),
    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),
}

const TOPIC_PREFIX: &str = "Chủ đề:";
const QUESTION_PREFIX: &str = "Câu hỏi:";
const ANSWER_PREFIX: &str = "ĐÁP ÁN ĐÚNG:";

pub const CSV_HEADER: [&str; 7] = [
    "question",
    "optionA",
    "optionB",
    "optionC",
    "optionD",
    "correctAnswerIndex",
    "topic",
];

#[derive(Default)]
struct Draft {
    question: Option<String>,
    options: Vec<String>,
    topic: Option<String>,
}

/// Parses the plain-text format admins paste in:
///
/// ```text
/// Chủ đề: Hóa học hữu cơ
/// Câu hỏi: Chất nào sau đây là một anken?
/// A. CH4
/// B. C2H2
/// C. C2H4
/// D. C6H6
/// ĐÁP ÁN ĐÚNG: C
/// ```
///
/// A topic line applies to every question after it. Questions without four
/// options or a valid answer letter are dropped.
pub fn parse_bulk(text: &str) -> Result<Vec<Question>, ImportError> {
    let mut questions = Vec::new();
    let mut draft = Draft::default();
    let mut topic: Option<String> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix(TOPIC_PREFIX) {
            topic = Some(rest.trim().to_string()).filter(|t| !t.is_empty());
        } else if let Some(rest) = line.strip_prefix(QUESTION_PREFIX) {
            draft = Draft {
                question: Some(rest.trim().to_string()),
                options: Vec::new(),
                topic: topic.clone(),
            };
        } else if let Some(option) = option_line(line) {
            draft.options.push(option.to_string());
        } else if let Some(rest) = line.strip_prefix(ANSWER_PREFIX) {
            let answer = OptionLetter::parse(rest);
            let finished = std::mem::take(&mut draft);
            if let (Some(answer), Some(question)) = (answer, finished.question) {
                if let Ok(options) = <[String; OPTION_COUNT]>::try_from(finished.options) {
                    questions.push(Question {
                        id: String::new(),
                        question,
                        options,
                        answer: answer.index(),
                        topic: finished.topic,
                    });
                }
            }
        }
    }

    if questions.is_empty() {
        return Err(ImportError::NoQuestions);
    }
    Ok(questions)
}

/// Renders a question back into the paste format, for editing.
pub fn format_bulk(question: &Question) -> String {
    let mut lines = Vec::new();
    if let Some(topic) = &question.topic {
        lines.push(format!("{} {}", TOPIC_PREFIX, topic));
    }
    lines.push(format!("{} {}", QUESTION_PREFIX, question.question));
    for (letter, option) in OptionLetter::ALL.iter().zip(&question.options) {
        lines.push(format!("{}. {}", letter, option));
    }
    lines.push(format!("{} {}", ANSWER_PREFIX, question.correct_letter()));
    lines.join("\n")
}

/// "A. text" -> "text"
fn option_line(line: &str) -> Option<&str> {
    let mut chars = line.chars();
    let letter = chars.next()?;
    if !('A'..='D').contains(&letter) || chars.next()? != '.' {
        return None;
    }
    let rest = chars.as_str();
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Columns: question, four options, 0-based answer index, optional topic.
/// A first line mentioning "question" is taken as the header.
pub fn parse_csv(text: &str) -> Result<Vec<Question>, ImportError> {
    let text = text.trim_start_matches('\u{feff}');
    let has_header = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.to_lowercase().contains("question"))
        .unwrap_or(false);

    let mut reader = ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut questions = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() < 6 {
            return Err(ImportError::TooFewColumns(line));
        }

        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        let options = [field(1), field(2), field(3), field(4)];
        let answer = field(5)
            .parse::<usize>()
            .ok()
            .filter(|a| *a < OPTION_COUNT)
            .ok_or(ImportError::InvalidLine(line))?;
        let topic = Some(field(6)).filter(|t| !t.is_empty());

        let question = Question {
            id: String::new(),
            question: field(0),
            options,
            answer,
            topic,
        };
        if !question.is_well_formed() {
            return Err(ImportError::InvalidLine(line));
        }
        questions.push(question);
    }

    if questions.is_empty() {
        return Err(ImportError::NoQuestions);
    }
    Ok(questions)
}

/// CSV with a BOM so spreadsheet tools pick up UTF-8.
pub fn export_csv(questions: &[Question]) -> Result<Vec<u8>, ImportError> {
    let mut out = Vec::new();
    out.write_all("\u{feff}".as_bytes())?;
    writeln!(out, "{}", CSV_HEADER.join(","))?;

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(&mut out);
    for q in questions {
        let answer = q.answer.to_string();
        let topic = q.topic.as_deref().unwrap_or_default();
        writer.write_record([
            q.question.as_str(),
            q.options[0].as_str(),
            q.options[1].as_str(),
            q.options[2].as_str(),
            q.options[3].as_str(),
            answer.as_str(),
            topic,
        ])?;
    }
    writer.flush()?;
    drop(writer);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BULK: &str = "
Chủ đề: Hóa học hữu cơ
Câu hỏi: Chất nào sau đây là một anken?
A. CH4
B. C2H2
C. C2H4
D. C6H6
ĐÁP ÁN ĐÚNG: C

Câu hỏi: Thiếu đáp án?
A. 1
B. 2
ĐÁP ÁN ĐÚNG: A
Chủ đề: Nitơ - Photpho
Câu hỏi: Số oxi hóa của N trong NH3?
A. +3
B. -3
C. 0
D. +5
ĐÁP ÁN ĐÚNG: b
";

    #[test]
    fn bulk_text_yields_complete_questions() {
        let questions = parse_bulk(BULK).unwrap();
        assert_eq!(questions.len(), 2);

        assert_eq!(questions[0].question, "Chất nào sau đây là một anken?");
        assert_eq!(questions[0].options[2], "C2H4");
        assert_eq!(questions[0].answer, 2);
        assert_eq!(questions[0].topic.as_deref(), Some("Hóa học hữu cơ"));

        assert_eq!(questions[1].answer, 1);
        assert_eq!(questions[1].topic.as_deref(), Some("Nitơ - Photpho"));
    }

    #[test]
    fn formatted_question_parses_back() {
        let question = crate::quiz::initial_questions().remove(5);
        let text = format_bulk(&question);
        assert!(text.starts_with("Chủ đề: Sự điện li & pH\nCâu hỏi: "));
        let parsed = parse_bulk(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].options, question.options);
        assert_eq!(parsed[0].answer, question.answer);
        assert_eq!(parsed[0].topic, question.topic);
    }

    #[test]
    fn bulk_text_without_questions_is_an_error() {
        assert!(matches!(
            parse_bulk("Câu hỏi: X?\nĐÁP ÁN ĐÚNG: E"),
            Err(ImportError::NoQuestions)
        ));
    }

    #[test]
    fn option_lines_need_letter_dot_space() {
        assert_eq!(option_line("A. CH4"), Some("CH4"));
        assert_eq!(option_line("D.  C6H6 "), Some("C6H6"));
        assert_eq!(option_line("E. x"), None);
        assert_eq!(option_line("A.x"), None);
        assert_eq!(option_line("Axit"), None);
    }

    #[test]
    fn csv_with_header_and_quotes() {
        let text = "question,optionA,optionB,optionC,optionD,correctAnswerIndex,topic\n\
                    \"Dãy nào, sau đây?\",\"HCl, NaOH\",B,C,D,0,Sự điện li\n\
                    Khí nào?,N2,O2,H2,He,3,\n";
        let questions = parse_csv(text).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "Dãy nào, sau đây?");
        assert_eq!(questions[0].options[0], "HCl, NaOH");
        assert_eq!(questions[0].topic.as_deref(), Some("Sự điện li"));
        assert_eq!(questions[1].answer, 3);
        assert_eq!(questions[1].topic, None);
    }

    #[test]
    fn csv_reports_the_offending_line() {
        let text = "Q1?,a,b,c,d,1\nQ2?,a,b,c,d,9\n";
        assert!(matches!(parse_csv(text), Err(ImportError::InvalidLine(2))));

        let short = "Q1?,a,b,c,d,1\nQ2?,a,b\n";
        assert!(matches!(parse_csv(short), Err(ImportError::TooFewColumns(2))));

        let blank = "Q1?,a,,c,d,1\n";
        assert!(matches!(parse_csv(blank), Err(ImportError::InvalidLine(1))));
    }

    #[test]
    fn exported_bank_imports_back() {
        let questions = crate::quiz::initial_questions();
        let bytes = export_csv(&questions).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("\u{feff}question,optionA"));

        let imported = parse_csv(&text).unwrap();
        assert_eq!(imported.len(), questions.len());
        for (original, back) in questions.iter().zip(&imported) {
            assert_eq!(back.question, original.question);
            assert_eq!(back.options, original.options);
            assert_eq!(back.answer, original.answer);
            assert_eq!(back.topic, original.topic);
        }
    }
}
