use super::*;

struct IntentRule {
    name: &'static str,
    // Tested against the upper-cased command body.
    matches: fn(&str) -> bool,
    build: fn(&str) -> Intent,
}

// Order matters: later rules are looser and would shadow earlier ones.
const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        name: "show",
        matches: is_show,
        build: build_show,
    },
    IntentRule {
        name: "joke",
        matches: is_joke,
        build: build_joke,
    },
    IntentRule {
        name: "time",
        matches: is_time,
        build: build_time,
    },
    IntentRule {
        name: "sunrise",
        matches: is_sunrise,
        build: build_sunrise,
    },
    IntentRule {
        name: "sunset",
        matches: is_sunset,
        build: build_sunset,
    },
    IntentRule {
        name: "moon",
        matches: is_moon,
        build: build_moon,
    },
    IntentRule {
        name: "help",
        matches: is_help,
        build: build_help,
    },
];

/// Returns the command addressed to the bot: the text right after `mention`,
/// minus one separator character. `None` if the bot is not mentioned.
pub(super) fn extract_command<'a>(text: &'a str, mention: &str) -> Option<&'a str> {
    let start = text.find(mention)? + mention.len();
    let mut body = &text[start..];
    if let Some(first) = body.chars().next() {
        if first == ':' || first == ',' || first.is_whitespace() {
            body = &body[first.len_utf8()..];
        }
    }
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

pub(super) fn classify(body: &str) -> Option<Intent> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let upper = body.to_ascii_uppercase();
    for rule in INTENT_RULES {
        if (rule.matches)(&upper) {
            debug!("matched {} rule", rule.name);
            return Some((rule.build)(body));
        }
    }
    Some(Intent::Sarcasm(body.to_string()))
}

pub(super) fn parse_request(text: &str, mention: &str) -> Option<Intent> {
    extract_command(text, mention).and_then(classify)
}

fn is_show(upper: &str) -> bool {
    upper.starts_with("SHOW")
}

fn is_joke(upper: &str) -> bool {
    upper.starts_with("TELL") && upper.contains("JOKE")
}

fn is_time(upper: &str) -> bool {
    upper.starts_with("TIME")
}

fn is_sunrise(upper: &str) -> bool {
    upper.contains("SUNRISE")
}

fn is_sunset(upper: &str) -> bool {
    upper.contains("SUNSET")
}

fn is_moon(upper: &str) -> bool {
    upper == "MOON" || upper.contains("MOON PHASE")
}

fn is_help(upper: &str) -> bool {
    upper == "HELP"
}

fn build_show(body: &str) -> Intent {
    // ASCII upper-casing keeps byte offsets aligned with `body`.
    let upper = body.to_ascii_uppercase();
    let skip = if upper == "SHOW ME" || upper.starts_with("SHOW ME ") {
        7
    } else {
        4
    };
    let rest = body.get(skip..).unwrap_or("");
    let mut fields = rest.split(',').map(str::trim);
    let object_name = fields.next().unwrap_or("").to_string();
    let mut optional = || {
        fields
            .next()
            .filter(|field| !field.is_empty())
            .map(str::to_string)
    };
    let date = optional();
    let band = optional();
    let mode = optional();
    Intent::Show(FilterSpec {
        object_name,
        date,
        band,
        mode,
    })
}

fn build_joke(_: &str) -> Intent {
    Intent::TellJoke
}

fn build_sunrise(_: &str) -> Intent {
    Intent::Sunrise
}

fn build_sunset(_: &str) -> Intent {
    Intent::Sunset
}

fn build_moon(_: &str) -> Intent {
    Intent::Moon
}

fn build_help(_: &str) -> Intent {
    Intent::Help
}

fn build_time(body: &str) -> Intent {
    Intent::Time(body.get(4..).unwrap_or("").trim().to_string())
}

/// Canned replies for anything that is not a real command, keyed on the
/// first word (or second word, or a mentioned instrument).
pub(super) fn sarcastic_reply(body: &str) -> &'static str {
    let upper = body.trim().to_ascii_uppercase();
    let mut words = upper.split_whitespace();
    let first = words.next().unwrap_or("");
    let second = words.next().unwrap_or("");

    match first {
        "WHO" => return "Who? Definitely not me.",
        "WHERE" => return "Somewhere between the primary mirror and the detector.",
        "WHEN" => return "When the seeing gets better. So, never.",
        "WHY" => return "Why not? Take it up with the TAC.",
        "NEEDS" => return "Needs more KL modes.",
        "SHOULD" => return "You should probably get some sleep first.",
        "MAKE" => return "Make it yourself, I'm busy reducing data.",
        _ => {}
    }
    if second == "ME" {
        return "I don't take orders from you.";
    }
    if upper.contains("GPI") || upper.contains("SPHERE") {
        return "GPI is better than SPHERE. Obviously.";
    }
    if first == "WHAT" {
        return "What do you think?";
    }
    "I'm sorry, I'm afraid I can't do that."
}
