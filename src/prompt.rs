use crate::config::MediaMode;

/// Frame-by-frame reasoning prompt; the answer goes in `<answer></answer>` tags.
pub const FRAMES_TEMPLATE: &str = "\
You have {frame_count} equally spaced frames (Frame 1 through Frame {frame_count}) captured from a \
short dashcam video, taken from the driver's forward-facing perspective.

Using these frames, answer the following multiple-choice question by choosing the single best \
answer. Use any relevant details observed in the frames (lanes, signage, vehicles, pedestrians, \
traffic signals, road markings, obstructions) and consider how they change across frames. \
Explain your reasoning, then output the final choice in <answer></answer> tags.

Now, here is the question and its multiple-choice options:

{question}
";

/// Same task over a single video attachment.
pub const VIDEO_TEMPLATE: &str = "\
You are analyzing a dashcam video taken from the driver's forward-facing perspective.

Using this video, answer the following multiple-choice question by choosing the single best \
answer. Relate what you observe to each option, eliminate those inconsistent with the visual \
evidence or standard traffic rules, and output the final choice in <answer></answer> tags.

Question: {question}
";

/// System instruction for the answer-extraction pass.
pub const EXTRACT_SYSTEM_PROMPT: &str = "Extract the letter choice (A, B, C, D, or E) that is \
indicated as the answer in the text. Output the answer in tags like this: <answer>B</answer>";

/// A prompt with `{question}` and optional `{frame_count}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn for_media(mode: MediaMode) -> Self {
        match mode {
            MediaMode::Frames => Self::new(FRAMES_TEMPLATE),
            MediaMode::Video => Self::new(VIDEO_TEMPLATE),
        }
    }

    pub fn has_question_slot(&self) -> bool {
        self.template.contains("{question}")
    }

    pub fn render(&self, question: &str, frame_count: usize) -> String {
        self.template
            .replace("{frame_count}", &frame_count.to_string())
            .replace("{question}", question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_question_and_frame_count() {
        let t = PromptTemplate::for_media(MediaMode::Frames);
        let p = t.render("Which lane?\nA. left\nB. right", 8);
        assert!(p.contains("8 equally spaced frames"));
        assert!(p.contains("Frame 1 through Frame 8"));
        assert!(p.ends_with("Which lane?\nA. left\nB. right\n"));
    }

    #[test]
    fn question_text_is_not_reinterpreted() {
        let t = PromptTemplate::new("{question}");
        assert_eq!(t.render("literal {frame_count}", 5), "literal {frame_count}");
    }
}
