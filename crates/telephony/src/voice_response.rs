//! Voice response rendering
//!
//! Builds the XML document the provider executes after a webhook:
//! speak text, gather speech, open a media stream, hang up.

use std::fmt::Write as _;

/// One response verb.
#[derive(Debug, Clone)]
enum Verb {
    Say { text: String, voice: String },
    GatherSpeech {
        timeout_secs: u64,
        action: String,
        prompts: Vec<(String, String)>,
    },
    ConnectStream { url: String },
    Pause { length_secs: u64 },
    Hangup,
}

/// Builder for a provider voice response document.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speak `text` with the given provider voice.
    pub fn say(mut self, text: &str, voice: &str) -> Self {
        self.verbs.push(Verb::Say {
            text: text.to_string(),
            voice: voice.to_string(),
        });
        self
    }

    /// Collect speech for up to `timeout_secs`, posting the transcript
    /// to `action`.
    pub fn gather_speech(mut self, timeout_secs: u64, action: &str) -> Self {
        self.verbs.push(Verb::GatherSpeech {
            timeout_secs,
            action: action.to_string(),
            prompts: Vec::new(),
        });
        self
    }

    /// Speak `text` inside the gather, so the human can cut the
    /// playback short by talking over it. This is what makes agent
    /// utterances interruptible in webhook mode.
    pub fn gather_prompt(mut self, timeout_secs: u64, action: &str, text: &str, voice: &str) -> Self {
        match self.verbs.last_mut() {
            Some(Verb::GatherSpeech {
                timeout_secs: t,
                action: a,
                prompts,
            }) if *t == timeout_secs && a == action => {
                prompts.push((text.to_string(), voice.to_string()));
            }
            _ => {
                self.verbs.push(Verb::GatherSpeech {
                    timeout_secs,
                    action: action.to_string(),
                    prompts: vec![(text.to_string(), voice.to_string())],
                });
            }
        }
        self
    }

    /// Open a bidirectional media stream to `url`.
    pub fn connect_stream(mut self, url: &str) -> Self {
        self.verbs.push(Verb::ConnectStream {
            url: url.to_string(),
        });
        self
    }

    /// Hold the call open for `length_secs`.
    pub fn pause(mut self, length_secs: u64) -> Self {
        self.verbs.push(Verb::Pause { length_secs });
        self
    }

    /// End the call.
    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    /// Render the XML document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>");

        for verb in &self.verbs {
            match verb {
                Verb::Say { text, voice } => {
                    let _ = write!(
                        xml,
                        "<Say voice=\"{}\">{}</Say>",
                        xml_escape(voice),
                        xml_escape(text)
                    );
                }
                Verb::GatherSpeech {
                    timeout_secs,
                    action,
                    prompts,
                } => {
                    if prompts.is_empty() {
                        let _ = write!(
                            xml,
                            "<Gather input=\"speech\" timeout=\"{}\" action=\"{}\"/>",
                            timeout_secs,
                            xml_escape(action)
                        );
                    } else {
                        let _ = write!(
                            xml,
                            "<Gather input=\"speech\" timeout=\"{}\" action=\"{}\">",
                            timeout_secs,
                            xml_escape(action)
                        );
                        for (text, voice) in prompts {
                            let _ = write!(
                                xml,
                                "<Say voice=\"{}\">{}</Say>",
                                xml_escape(voice),
                                xml_escape(text)
                            );
                        }
                        xml.push_str("</Gather>");
                    }
                }
                Verb::ConnectStream { url } => {
                    let _ = write!(
                        xml,
                        "<Connect><Stream url=\"{}\"/></Connect>",
                        xml_escape(url)
                    );
                }
                Verb::Pause { length_secs } => {
                    let _ = write!(xml, "<Pause length=\"{}\"/>", length_secs);
                }
                Verb::Hangup => xml.push_str("<Hangup/>"),
            }
        }

        xml.push_str("</Response>");
        xml
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
