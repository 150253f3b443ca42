pub mod ai_helper;
pub mod bank;
pub mod import;
pub mod leaderboard;
pub mod prizes;
pub mod round;
mod store;

use std::fmt;

/// Every question carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option, 0..=3
    pub answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        options: [&str; OPTION_COUNT],
        answer: usize,
        topic: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            options: options.map(String::from),
            answer,
            topic: topic.map(String::from),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.answer < OPTION_COUNT
            && !self.question.trim().is_empty()
            && self.options.iter().all(|o| !o.trim().is_empty())
    }

    pub fn correct_letter(&self) -> OptionLetter {
        // answer is validated before a question reaches a round
        OptionLetter::from_index(self.answer).unwrap_or(OptionLetter::A)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; OPTION_COUNT] =
        [OptionLetter::A, OptionLetter::B, OptionLetter::C, OptionLetter::D];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            OptionLetter::A => 0,
            OptionLetter::B => 1,
            OptionLetter::C => 2,
            OptionLetter::D => 3,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "A" => Some(OptionLetter::A),
            "B" => Some(OptionLetter::B),
            "C" => Some(OptionLetter::C),
            "D" => Some(OptionLetter::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            OptionLetter::A => "A",
            OptionLetter::B => "B",
            OptionLetter::C => "C",
            OptionLetter::D => "D",
        };
        f.write_str(letter)
    }
}

/// The starter bank used until an admin saves their own questions.
pub fn initial_questions() -> Vec<Question> {
    vec![
        Question::new(
            "chem11_1",
            "Dung dịch chất nào sau đây làm quỳ tím hóa xanh?",
            ["HCl", "NaOH", "NaCl", "H2SO4"],
            1,
            Some("Sự điện li & pH"),
        ),
        Question::new(
            "chem11_2",
            "Chất nào sau đây là một anken?",
            ["CH4", "C2H2", "C2H4", "C6H6"],
            2,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_3",
            "Công thức hóa học của axit nitric là gì?",
            ["HNO2", "H2SO4", "HCl", "HNO3"],
            3,
            Some("Nitơ - Photpho"),
        ),
        Question::new(
            "chem11_4",
            "Phản ứng đặc trưng của ankan là gì?",
            [
                "Phản ứng cộng",
                "Phản ứng trùng hợp",
                "Phản ứng thế",
                "Phản ứng oxi hóa - khử",
            ],
            2,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_5",
            "Số oxi hóa của N trong NH3 là bao nhiêu?",
            ["+3", "-3", "0", "+5"],
            1,
            Some("Nitơ - Photpho"),
        ),
        Question::new(
            "chem11_6",
            "Dãy nào sau đây gồm các chất điện li mạnh?",
            [
                "HCl, NaOH, CH3COOH",
                "H2SO4, KCl, Ba(OH)2",
                "H2S, NaCl, H2O",
                "CaCO3, Mg(OH)2, FeS",
            ],
            1,
            Some("Sự điện li & pH"),
        ),
        Question::new(
            "chem11_7",
            "Trong công nghiệp, amoniac (NH3) được sản xuất chủ yếu từ đâu?",
            [
                "Khí nitơ và khí hiđro",
                "Phân hủy amoni nitrat",
                "Khí nitơ và khí oxi",
                "Phân đạm urê",
            ],
            0,
            Some("Nitơ - Photpho"),
        ),
        Question::new(
            "chem11_8",
            "Ancol etylic có công thức phân tử là gì?",
            ["CH3OH", "C2H5OH", "C3H7OH", "CH3COOH"],
            1,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_9",
            "Kim loại nào sau đây không tác dụng với dung dịch HNO3 đặc, nguội?",
            ["Cu", "Mg", "Al", "Ag"],
            2,
            Some("Nitơ - Photpho"),
        ),
        Question::new(
            "chem11_10",
            "Phenolphtalein chuyển màu gì trong môi trường bazơ?",
            ["Màu xanh", "Màu vàng", "Không màu", "Màu hồng"],
            3,
            Some("Sự điện li & pH"),
        ),
        Question::new(
            "chem11_11",
            "Thành phần chính của khí thiên nhiên là gì?",
            ["Etan", "Propan", "Metan", "Butan"],
            2,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_12",
            "Chất nào được dùng để khử chua đất trồng?",
            ["NaCl", "Ca(OH)2", "H2SO4", "KNO3"],
            1,
            Some("Sự điện li & pH"),
        ),
        Question::new(
            "chem11_13",
            "Phản ứng giữa ancol và axit cacboxylic được gọi là gì?",
            [
                "Phản ứng xà phòng hóa",
                "Phản ứng este hóa",
                "Phản ứng trùng ngưng",
                "Phản ứng hiđro hóa",
            ],
            1,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_14",
            "Trong phân tử benzen (C6H6) có bao nhiêu liên kết pi (π)?",
            ["1", "2", "3", "6"],
            2,
            Some("Hóa học hữu cơ"),
        ),
        Question::new(
            "chem11_15",
            "Nguyên tố photpho (P) có thể có các số oxi hóa nào trong hợp chất?",
            ["-3, 0, +3, +5", "-3, +3, +5", "-2, 0, +2, +4", "Chỉ có 0 và +5"],
            0,
            Some("Nitơ - Photpho"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_map_to_indexes() {
        for (i, letter) in OptionLetter::ALL.iter().enumerate() {
            assert_eq!(letter.index(), i);
            assert_eq!(OptionLetter::from_index(i), Some(*letter));
        }
        assert_eq!(OptionLetter::from_index(4), None);
        assert_eq!(OptionLetter::parse(" c "), Some(OptionLetter::C));
        assert_eq!(OptionLetter::parse("E"), None);
    }

    #[test]
    fn initial_questions_fill_the_ladder() {
        let questions = initial_questions();
        assert_eq!(questions.len(), prizes::PRIZE_LEVELS.len());
        assert!(questions.iter().all(Question::is_well_formed));
    }

    #[test]
    fn topic_is_omitted_from_json_when_absent() {
        let q = Question::new("x", "Q?", ["a", "b", "c", "d"], 0, None);
        let json = serde_json::to_string(&q).unwrap();
        assert!(!json.contains("topic"));
        let back: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
