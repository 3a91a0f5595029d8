//! Tokenizer, stop-word table and rule lemmatizer that make up the
//! normalization step.
//!
//! The model is data: a TOML document listing stop words, clitic suffixes and
//! lemma rules. `LinguisticModel::english()` loads the copy bundled with the
//! crate; deployments can point `artifacts.linguistic_model` at their own.

use crate::error::ArtifactError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use unicode_segmentation::UnicodeSegmentation;

const BUNDLED_ENGLISH: &str = include_str!("../assets/en_core.toml");
const MAX_PASSES: usize = 8;

#[derive(Debug, Deserialize)]
struct ModelFile {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    stop_words: Vec<String>,
    #[serde(default)]
    clitics: Vec<String>,
    #[serde(default)]
    lemma: LemmaFile,
}

#[derive(Debug, Default, Deserialize)]
struct LemmaFile {
    #[serde(default = "default_min_stem")]
    min_stem: usize,
    #[serde(default)]
    undouble_exempt: Vec<String>,
    #[serde(default)]
    e_restore: Vec<String>,
    #[serde(default)]
    rules: Vec<SuffixRule>,
    #[serde(default)]
    exceptions: BTreeMap<String, String>,
}

fn default_min_stem() -> usize {
    2
}

/// One ordered suffix rewrite. The first rule whose suffix matches wins.
#[derive(Debug, Clone, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub replace: String,
    /// Minimum stem length in characters; falls back to the model default.
    #[serde(default)]
    pub min_stem: Option<usize>,
    /// Collapse a doubled final consonant left behind ("runn" -> "run").
    #[serde(default)]
    pub undouble: bool,
    /// Put back a dropped silent "e" ("creat" -> "create").
    #[serde(default)]
    pub restore_e: bool,
}

#[derive(Debug, Clone)]
struct Lemmatizer {
    min_stem: usize,
    undouble_exempt: HashSet<char>,
    e_restore: HashSet<String>,
    rules: Vec<SuffixRule>,
    exceptions: BTreeMap<String, String>,
}

impl Lemmatizer {
    fn lemma(&self, word: &str) -> String {
        let mut current = word.to_string();
        // Bounded so a cyclic exceptions table cannot hang; `validate` rejects those.
        for _ in 0..MAX_PASSES {
            let next = self.step(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn step(&self, word: &str) -> String {
        if let Some(lemma) = self.exceptions.get(word) {
            return lemma.clone();
        }
        for rule in &self.rules {
            let Some(stem) = word.strip_suffix(rule.suffix.as_str()) else {
                continue;
            };
            let min = rule.min_stem.unwrap_or(self.min_stem);
            if stem.chars().count() < min {
                continue;
            }
            if rule.suffix == rule.replace {
                return word.to_string();
            }
            let mut base = stem.to_string();
            let mut undoubled = false;
            if rule.undouble {
                if let Some(shorter) = self.undouble(&base) {
                    base = shorter;
                    undoubled = true;
                }
            }
            if rule.restore_e && !undoubled && self.wants_e(&base) {
                base.push('e');
            }
            base.push_str(&rule.replace);
            return base;
        }
        word.to_string()
    }

    fn undouble(&self, stem: &str) -> Option<String> {
        let mut chars = stem.chars().rev();
        let last = chars.next()?;
        let prev = chars.next()?;
        if last == prev && is_consonant(last) && !self.undouble_exempt.contains(&last) {
            let mut out = stem.to_string();
            out.pop();
            Some(out)
        } else {
            None
        }
    }

    fn wants_e(&self, stem: &str) -> bool {
        if self.e_restore.contains(stem) {
            return true;
        }
        let tail: Vec<char> = stem.chars().rev().take(3).collect();
        let (Some(&last), Some(&prev)) = (tail.first(), tail.get(1)) else {
            return false;
        };
        let cvc = |vowels: &str| vowels.contains(prev) && tail.get(2).is_some_and(|c| is_consonant(*c));
        match last {
            'c' | 'v' | 'u' => true,
            'z' => prev != 'z',
            's' => prev != 's',
            'g' => is_consonant(prev) && !matches!(prev, 'n' | 'g'),
            'l' => is_consonant(prev) && !matches!(prev, 'l' | 'r' | 'w'),
            't' => cvc("au"),
            'd' => cvc("aeiou"),
            'b' | 'n' => cvc("i"),
            'r' => cvc("aiu") || stem.ends_with("uir"),
            'm' | 'k' => cvc("aiou"),
            _ => false,
        }
    }
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// One token as seen by normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Set for alphabetic, non-stop tokens.
    pub lemma: Option<String>,
    pub is_stop: bool,
    pub is_punct: bool,
}

impl Token {
    /// The form this token contributes to normalized text, if any.
    pub fn output(&self) -> Option<&str> {
        if self.is_stop || self.is_punct {
            return None;
        }
        Some(self.lemma.as_deref().unwrap_or(&self.text))
    }
}

#[derive(Debug, Clone)]
pub struct LinguisticModel {
    name: String,
    version: Option<String>,
    stop_words: HashSet<String>,
    clitics: Vec<String>,
    lemmatizer: Lemmatizer,
}

impl LinguisticModel {
    /// The English model shipped inside the crate.
    pub fn english() -> Result<Self, ArtifactError> {
        Self::parse(BUNDLED_ENGLISH, Path::new("<bundled en_core>"))
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ArtifactError> {
        Self::parse(raw, Path::new("<inline>"))
    }

    fn parse(raw: &str, origin: &Path) -> Result<Self, ArtifactError> {
        let file: ModelFile = toml::from_str(raw).map_err(|e| ArtifactError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        let model = Self {
            name: file.name,
            version: file.version,
            stop_words: file.stop_words.iter().map(|w| w.to_lowercase()).collect(),
            clitics: file.clitics,
            lemmatizer: Lemmatizer {
                min_stem: file.lemma.min_stem.max(1),
                undouble_exempt: file
                    .lemma
                    .undouble_exempt
                    .iter()
                    .filter_map(|s| s.chars().next())
                    .collect(),
                e_restore: file.lemma.e_restore.into_iter().collect(),
                rules: file.lemma.rules,
                exceptions: file.lemma.exceptions,
            },
        };
        model.validate(origin)?;
        Ok(model)
    }

    /// Exception targets must be fixed points, otherwise normalizing twice
    /// could differ from normalizing once.
    fn validate(&self, origin: &Path) -> Result<(), ArtifactError> {
        for rule in &self.lemmatizer.rules {
            if rule.suffix.is_empty() {
                return Err(invalid(origin, "lemma rule with empty suffix".into()));
            }
        }
        for (word, target) in &self.lemmatizer.exceptions {
            if target.is_empty() {
                return Err(invalid(origin, format!("exception {word:?} maps to empty lemma")));
            }
            let again = self.lemmatizer.lemma(target);
            if &again != target {
                return Err(invalid(
                    origin,
                    format!("lemma {target:?} for {word:?} is not stable (becomes {again:?})"),
                ));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn stop_word_count(&self) -> usize {
        self.stop_words.len()
    }

    pub fn is_stop(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    pub fn lemma(&self, word: &str) -> String {
        self.lemmatizer.lemma(word)
    }

    /// Lowercase, split on Unicode word boundaries and tag every token.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let lowered = text.to_lowercase().replace('\u{2019}', "'");
        let mut tokens = Vec::new();
        for segment in lowered.split_word_bounds() {
            if segment.chars().all(char::is_whitespace) {
                continue;
            }
            if !segment.chars().any(char::is_alphanumeric) {
                tokens.push(Token {
                    text: segment.to_string(),
                    lemma: None,
                    is_stop: false,
                    is_punct: true,
                });
                continue;
            }
            for piece in self.split_clitic(segment) {
                tokens.push(self.tag(piece));
            }
        }
        tokens
    }

    fn tag(&self, piece: &str) -> Token {
        let is_stop = self.is_stop(piece);
        let mut lemma = None;
        let mut drop = is_stop;
        if !is_stop && piece.chars().all(char::is_alphabetic) {
            let l = self.lemma(piece);
            drop = self.is_stop(&l);
            lemma = Some(l);
        }
        Token {
            text: piece.to_string(),
            lemma,
            is_stop: drop,
            is_punct: false,
        }
    }

    fn split_clitic<'a>(&self, word: &'a str) -> Vec<&'a str> {
        if self.clitics.iter().any(|c| c == "n't") && word.chars().count() > 3 {
            if let Some(base) = word.strip_suffix("n't") {
                return vec![base, &word[base.len()..]];
            }
        }
        if let Some(pos) = word.rfind('\'') {
            let (base, clitic) = word.split_at(pos);
            if !base.is_empty() && self.clitics.iter().any(|c| c == clitic) {
                return vec![base, clitic];
            }
        }
        vec![word]
    }

    /// Content-word lemmas joined by single spaces.
    pub fn normalize(&self, text: &str) -> String {
        let tokens = self.analyze(text);
        let words: Vec<&str> = tokens.iter().filter_map(Token::output).collect();
        words.join(" ")
    }
}

fn invalid(origin: &Path, message: String) -> ArtifactError {
    ArtifactError::Parse {
        path: PathBuf::from(origin),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn english() -> LinguisticModel {
        LinguisticModel::english().unwrap()
    }

    #[test]
    fn bundled_model_loads() {
        let model = english();
        assert_eq!(model.name(), "en_core");
        assert!(model.stop_word_count() > 300);
        assert!(model.is_stop("the"));
    }

    #[test]
    fn drops_stop_words_and_lemmatizes() {
        assert_eq!(english().normalize("the cats are running quickly"), "cat run quickly");
    }

    #[test]
    fn punctuation_and_stop_words_only_yield_empty() {
        let model = english();
        assert_eq!(model.normalize(""), "");
        assert_eq!(model.normalize("   \n\t"), "");
        assert_eq!(model.normalize("The, and... of!!"), "");
    }

    #[test]
    fn lemma_rules() {
        let model = english();
        let cases = [
            ("cats", "cat"),
            ("boxes", "box"),
            ("studies", "study"),
            ("hopping", "hop"),
            ("hoping", "hope"),
            ("created", "create"),
            ("visited", "visit"),
            ("passed", "pass"),
            ("glass", "glass"),
            ("status", "status"),
            ("analysis", "analysis"),
            ("children", "child"),
            ("went", "go"),
            ("news", "news"),
        ];
        for (word, lemma) in cases {
            assert_eq!(model.lemma(word), lemma, "lemma of {word}");
        }
    }

    #[test]
    fn clitics_are_split_and_dropped() {
        let model = english();
        assert_eq!(model.normalize("The senator's claims weren't true"), "senator claim true");
        assert_eq!(model.normalize("She didn\u{2019}t agree"), "agree");
    }

    #[test]
    fn normalization_is_idempotent() {
        let model = english();
        let samples = [
            "Breaking: Officials confirmed the bridges were closed after storms battered the coast.",
            "SHOCKING!!! You won't BELIEVE what doctors are hiding about vitamins in 2024...",
            "Stocks rallied 3.5% as investors weighed the central bank's decisions.",
            "O'Brien's rock'n'roll years; U.S. e-mail, covid-19 and café menus",
        ];
        for text in samples {
            let once = model.normalize(text);
            assert_eq!(model.normalize(&once), once, "input: {text}");
        }
    }

    #[test]
    fn analyze_marks_punctuation() {
        let tokens = english().analyze("Hello, world!");
        let punct: Vec<_> = tokens.iter().filter(|t| t.is_punct).map(|t| t.text.as_str()).collect();
        assert_eq!(punct, vec![",", "!"]);
    }

    #[test]
    fn unstable_exception_is_rejected() {
        let raw = r#"
            name = "broken"
            [lemma]
            [[lemma.rules]]
            suffix = "s"
            replace = ""
            [lemma.exceptions]
            geese = "gooses"
        "#;
        let err = LinguisticModel::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("not stable"));
    }
}
