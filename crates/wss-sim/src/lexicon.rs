//! Word-list sentiment and emotion analysis for review text.

/// Emotion classes, in the order of [`EmotionDistribution`].
pub const EMOTIONS: [&str; 4] = ["anger", "joy", "optimism", "sadness"];

pub type EmotionDistribution = [f64; 4];

const POSITIVE: &[(&str, f64)] = &[
    ("amazing", 1.0),
    ("awesome", 1.0),
    ("excellent", 1.0),
    ("fantastic", 1.0),
    ("outstanding", 1.0),
    ("perfect", 1.0),
    ("wonderful", 1.0),
    ("incredible", 1.0),
    ("best", 1.0),
    ("love", 1.0),
    ("loved", 1.0),
    ("delicious", 1.0),
    ("superb", 1.0),
    ("great", 0.8),
    ("fabulous", 0.8),
    ("impressive", 0.8),
    ("enjoyed", 0.7),
    ("friendly", 0.7),
    ("recommend", 0.7),
    ("fresh", 0.6),
    ("tasty", 0.7),
    ("helpful", 0.6),
    ("clean", 0.5),
    ("good", 0.5),
    ("nice", 0.5),
    ("pleasant", 0.5),
    ("happy", 0.6),
    ("attentive", 0.6),
    ("cozy", 0.5),
    ("quick", 0.4),
    ("reasonable", 0.4),
    ("fair", 0.3),
    ("decent", 0.3),
    ("fine", 0.2),
    ("ok", 0.1),
    ("okay", 0.1),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("awful", 1.0),
    ("terrible", 1.0),
    ("horrible", 1.0),
    ("worst", 1.0),
    ("disgusting", 1.0),
    ("hate", 1.0),
    ("hated", 1.0),
    ("inedible", 1.0),
    ("infested", 1.0),
    ("roaches", 0.9),
    ("rude", 0.8),
    ("dirty", 0.8),
    ("disappointing", 0.8),
    ("disappointed", 0.8),
    ("letdown", 0.8),
    ("nasty", 0.8),
    ("poor", 0.7),
    ("bad", 0.7),
    ("gross", 0.8),
    ("overpriced", 0.6),
    ("cold", 0.4),
    ("slow", 0.5),
    ("bland", 0.5),
    ("stale", 0.6),
    ("unhelpful", 0.6),
    ("uncomfortable", 0.6),
    ("broken", 0.5),
    ("mediocre", 0.4),
    ("wait", 0.2),
    ("expensive", 0.3),
    ("loud", 0.3),
    ("noisy", 0.3),
    ("inconvenient", 0.4),
    ("problem", 0.4),
    ("issues", 0.3),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "hardly", "barely", "without", "neither", "nor",
];

/// How many tokens after a negator are flipped.
const NEGATION_WINDOW: usize = 3;

const ANGER: &[&str] = &[
    "angry", "furious", "rude", "outraged", "annoyed", "annoying", "ridiculous", "unacceptable",
    "insulting", "hate", "hated", "worst", "terrible", "awful", "disgusting", "scam", "yelled",
    "frustrated", "frustrating", "irritated",
];

const JOY: &[&str] = &[
    "love", "loved", "amazing", "delicious", "wonderful", "fantastic", "awesome", "enjoyed",
    "happy", "delighted", "fun", "great", "perfect", "excellent", "best", "yummy", "beautiful",
    "pleasant", "tasty",
];

const OPTIMISM: &[&str] = &[
    "recommend", "hope", "hopefully", "definitely", "return", "back", "again", "looking",
    "forward", "promising", "improve", "improvement", "potential", "try", "next", "future",
    "worth", "glad",
];

const SADNESS: &[&str] = &[
    "sad", "disappointed", "disappointing", "unfortunately", "sadly", "miss", "missed", "lonely",
    "letdown", "regret", "sorry", "depressing", "bland", "mediocre", "closed", "lost", "wasted",
    "shame",
];

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token) || token.ends_with("n't")
}

fn weight(list: &[(&str, f64)], token: &str) -> Option<f64> {
    list.iter().find(|(w, _)| *w == token).map(|(_, s)| *s)
}

/// Sentiment polarity in [-1, 1]; 0 for text without sentiment words.
/// A negator flips the polarity of the next few words.
pub fn polarity(text: &str) -> f64 {
    let mut total = 0.0;
    let mut hits = 0usize;
    let mut negate_left = 0usize;
    for token in tokenize(text) {
        if is_negator(&token) {
            negate_left = NEGATION_WINDOW;
            continue;
        }
        let score = weight(POSITIVE, &token)
            .or_else(|| weight(NEGATIVE, &token).map(|w| -w));
        if let Some(mut s) = score {
            if negate_left > 0 {
                s = -s;
            }
            total += s;
            hits += 1;
        }
        negate_left = negate_left.saturating_sub(1);
    }
    if hits == 0 {
        0.0
    } else {
        (total / hits as f64).clamp(-1.0, 1.0)
    }
}

/// Normalised anger/joy/optimism/sadness distribution. Text without any
/// emotion words is uniform. Negated words are not counted.
pub fn emotions(text: &str) -> EmotionDistribution {
    let lists = [ANGER, JOY, OPTIMISM, SADNESS];
    let mut counts = [0.0f64; 4];
    let mut negate_left = 0usize;
    for token in tokenize(text) {
        if is_negator(&token) {
            negate_left = NEGATION_WINDOW;
            continue;
        }
        if negate_left == 0 {
            for (i, list) in lists.iter().enumerate() {
                if list.contains(&token.as_str()) {
                    counts[i] += 1.0;
                }
            }
        }
        negate_left = negate_left.saturating_sub(1);
    }
    let sum: f64 = counts.iter().sum();
    if sum == 0.0 {
        return [0.25; 4];
    }
    counts.map(|c| c / sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Didn't LOVE it, 'really'!"),
            vec!["didn't", "love", "it", "really"]
        );
    }

    #[test]
    fn test_polarity_signs() {
        assert!(polarity("The food was amazing and the staff friendly") > 0.5);
        assert!(polarity("Terrible service, rude staff, dirty tables") < -0.5);
        assert_eq!(polarity("We went on Tuesday"), 0.0);
    }

    #[test]
    fn test_polarity_negation() {
        assert!(polarity("not good") < 0.0);
        assert!(polarity("wasn't bad at all") > 0.0);
        // window closes after a few tokens
        assert!(polarity("not what we ordered but the pie was great") > 0.0);
    }

    #[test]
    fn test_polarity_bounded() {
        let p = polarity("best best best worst");
        assert!((-1.0..=1.0).contains(&p));
    }

    #[test]
    fn test_emotions_distribution() {
        let d = emotions("I loved it and will definitely return");
        assert!((d.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(d[1] > 0.0 && d[2] > 0.0);
        assert_eq!(d[0], 0.0);

        assert_eq!(emotions("a plain sentence"), [0.25; 4]);
        assert_eq!(emotions("not happy"), [0.25; 4]);
    }
}
