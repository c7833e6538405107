use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Short-term bias from the MA20 / MA50 relationship alone.
///
/// Returns the signal plus the reasons explaining it. With either average
/// missing (short history) or both equal there is no edge: neutral, no reasons.
pub fn classify(ma20: Option<f64>, ma50: Option<f64>) -> (Signal, Vec<String>) {
    let (Some(ma20), Some(ma50)) = (ma20, ma50) else {
        return (Signal::Neutral, Vec::new());
    };

    if ma20 > ma50 {
        (
            Signal::Bullish,
            vec!["MA20 above MA50, trend strengthening".into()],
        )
    } else if ma20 < ma50 {
        (
            Signal::Bearish,
            vec!["MA20 below MA50, trend weakening".into()],
        )
    } else {
        (Signal::Neutral, Vec::new())
    }
}
