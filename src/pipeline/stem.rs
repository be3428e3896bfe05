//! Porter stemmer for lowercase ASCII tokens.
//!
//! Follows Martin Porter's 1980 algorithm (steps 1a–5). Tokens containing
//! anything other than `a..=z` are returned unchanged, as are tokens of two
//! characters or fewer.

/// Stem a single token once.
pub fn porter_stem(token: &str) -> String {
    if token.len() <= 2 || !token.bytes().all(|c| c.is_ascii_lowercase()) {
        return token.to_string();
    }

    let mut s = Stemmer::new(token);
    s.step1ab();
    if s.k > 0 {
        s.step1c();
        s.step2();
        s.step3();
        s.step4();
        s.step5();
    }
    s.finish()
}

/// Stem a token repeatedly until it no longer changes.
///
/// A single Porter pass is not idempotent (`agreed` → `agre` → `agr`).
/// Passes never lengthen a token, so the loop is bounded by its length.
pub fn stem_to_fixpoint(token: &str) -> String {
    let mut current = token.to_string();
    for _ in 0..=token.len() {
        let next = porter_stem(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

struct Stemmer {
    b: Vec<u8>,
    /// Index of the last character of the current word.
    k: isize,
    /// End of the stem preceding the last matched suffix (may be -1).
    j: isize,
}

impl Stemmer {
    fn new(word: &str) -> Self {
        let b = word.as_bytes().to_vec();
        let k = b.len() as isize - 1;
        Self { b, k, j: 0 }
    }

    fn finish(mut self) -> String {
        self.b.truncate((self.k + 1) as usize);
        // Only ASCII lowercase bytes are ever written.
        String::from_utf8(self.b).unwrap_or_default()
    }

    fn at(&self, i: isize) -> u8 {
        self.b[i as usize]
    }

    fn cons(&self, i: isize) -> bool {
        match self.at(i) {
            b'a' | b'e' | b'i' | b'o' | b'u' => false,
            b'y' => i == 0 || !self.cons(i - 1),
            _ => true,
        }
    }

    /// Number of consonant-vowel sequences in `b[0..=j]`.
    fn m(&self) -> usize {
        let mut n = 0;
        let mut i = 0;
        loop {
            if i > self.j {
                return n;
            }
            if !self.cons(i) {
                break;
            }
            i += 1;
        }
        i += 1;
        loop {
            loop {
                if i > self.j {
                    return n;
                }
                if self.cons(i) {
                    break;
                }
                i += 1;
            }
            i += 1;
            n += 1;
            loop {
                if i > self.j {
                    return n;
                }
                if !self.cons(i) {
                    break;
                }
                i += 1;
            }
            i += 1;
        }
    }

    fn vowel_in_stem(&self) -> bool {
        (0..=self.j).any(|i| !self.cons(i))
    }

    fn double_cons(&self, i: isize) -> bool {
        i >= 1 && self.at(i) == self.at(i - 1) && self.cons(i)
    }

    /// consonant-vowel-consonant ending at `i`, last consonant not w, x or y.
    fn cvc(&self, i: isize) -> bool {
        if i < 2 || !self.cons(i) || self.cons(i - 1) || !self.cons(i - 2) {
            return false;
        }
        !matches!(self.at(i), b'w' | b'x' | b'y')
    }

    fn ends(&mut self, suffix: &str) -> bool {
        let len = suffix.len() as isize;
        if len > self.k + 1 {
            return false;
        }
        let start = (self.k - len + 1) as usize;
        if &self.b[start..=self.k as usize] != suffix.as_bytes() {
            return false;
        }
        self.j = self.k - len;
        true
    }

    fn set_to(&mut self, replacement: &str) {
        let start = (self.j + 1) as usize;
        self.b.truncate(start);
        self.b.extend_from_slice(replacement.as_bytes());
        self.k = self.j + replacement.len() as isize;
    }

    fn replace_if_measured(&mut self, replacement: &str) {
        if self.m() > 0 {
            self.set_to(replacement);
        }
    }

    /// Plurals and -ed / -ing.
    fn step1ab(&mut self) {
        if self.at(self.k) == b's' {
            if self.ends("sses") {
                self.k -= 2;
            } else if self.ends("ies") {
                self.set_to("i");
            } else if self.at(self.k - 1) != b's' {
                self.k -= 1;
            }
        }
        if self.ends("eed") {
            if self.m() > 0 {
                self.k -= 1;
            }
        } else if (self.ends("ed") || self.ends("ing")) && self.vowel_in_stem() {
            self.k = self.j;
            if self.ends("at") {
                self.set_to("ate");
            } else if self.ends("bl") {
                self.set_to("ble");
            } else if self.ends("iz") {
                self.set_to("ize");
            } else if self.double_cons(self.k) {
                self.k -= 1;
                if matches!(self.at(self.k), b'l' | b's' | b'z') {
                    self.k += 1;
                }
            } else if self.m() == 1 && self.cvc(self.k) {
                self.set_to("e");
            }
        }
    }

    /// Terminal y → i when there is another vowel in the stem.
    fn step1c(&mut self) {
        if self.ends("y") && self.vowel_in_stem() {
            let k = self.k as usize;
            self.b[k] = b'i';
        }
    }

    /// Double suffixes mapped to single ones.
    fn step2(&mut self) {
        const RULES: &[(&str, &str)] = &[
            ("ational", "ate"),
            ("tional", "tion"),
            ("enci", "ence"),
            ("anci", "ance"),
            ("izer", "ize"),
            ("bli", "ble"),
            ("alli", "al"),
            ("entli", "ent"),
            ("eli", "e"),
            ("ousli", "ous"),
            ("ization", "ize"),
            ("ation", "ate"),
            ("ator", "ate"),
            ("alism", "al"),
            ("iveness", "ive"),
            ("fulness", "ful"),
            ("ousness", "ous"),
            ("aliti", "al"),
            ("iviti", "ive"),
            ("biliti", "ble"),
            ("logi", "log"),
        ];
        self.apply_first(RULES, self.at(self.k - 1), 2);
    }

    /// -ic-, -full, -ness etc.
    fn step3(&mut self) {
        const RULES: &[(&str, &str)] = &[
            ("icate", "ic"),
            ("ative", ""),
            ("alize", "al"),
            ("iciti", "ic"),
            ("ical", "ic"),
            ("ful", ""),
            ("ness", ""),
        ];
        self.apply_first(RULES, self.at(self.k), 1);
    }

    /// Apply the first rule whose suffix matches and whose
    /// `probe`-from-the-end letter matches the word's; stop after a match.
    fn apply_first(&mut self, rules: &[(&str, &str)], key: u8, probe: usize) {
        for (suffix, replacement) in rules {
            let bytes = suffix.as_bytes();
            if bytes.len() < probe || bytes[bytes.len() - probe] != key {
                continue;
            }
            if self.ends(suffix) {
                self.replace_if_measured(replacement);
                return;
            }
        }
    }

    /// Remove -ant, -ence etc. in context <c>vcvc<v>.
    fn step4(&mut self) {
        const SUFFIXES: &[&str] = &[
            "al", "ance", "ence", "er", "ic", "able", "ible", "ant", "ement", "ment", "ent",
            "ion", "ou", "ism", "ate", "iti", "ous", "ive", "ize",
        ];
        let key = self.at(self.k - 1);
        let mut matched = false;
        for suffix in SUFFIXES {
            let bytes = suffix.as_bytes();
            if bytes[bytes.len() - 2] != key {
                continue;
            }
            if !self.ends(suffix) {
                continue;
            }
            if *suffix == "ion" {
                // -ion only after s or t
                if self.j >= 0 && matches!(self.at(self.j), b's' | b't') {
                    matched = true;
                    break;
                }
                continue;
            }
            matched = true;
            break;
        }
        if matched && self.m() > 1 {
            self.k = self.j;
        }
    }

    /// Remove a final -e and reduce -ll.
    fn step5(&mut self) {
        self.j = self.k;
        if self.at(self.k) == b'e' {
            let a = self.m();
            if a > 1 || (a == 1 && !self.cvc(self.k - 1)) {
                self.k -= 1;
            }
        }
        if self.at(self.k) == b'l' && self.double_cons(self.k) && self.m() > 1 {
            self.k -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_examples() {
        let cases = [
            ("caresses", "caress"),
            ("ponies", "poni"),
            ("cats", "cat"),
            ("feed", "feed"),
            ("agreed", "agre"),
            ("plastered", "plaster"),
            ("motoring", "motor"),
            ("sing", "sing"),
            ("conflated", "conflat"),
            ("hopping", "hop"),
            ("falling", "fall"),
            ("filing", "file"),
            ("happy", "happi"),
            ("relational", "relat"),
            ("hopeful", "hope"),
            ("goodness", "good"),
            ("revival", "reviv"),
            ("adoption", "adopt"),
            ("generalization", "gener"),
            ("controll", "control"),
            ("rate", "rate"),
        ];
        for (word, expected) in cases {
            assert_eq!(porter_stem(word), expected, "stemming {word}");
        }
    }

    #[test]
    fn sentiment_words_keep_recognisable_roots() {
        assert_eq!(porter_stem("love"), "love");
        assert_eq!(porter_stem("loved"), "love");
        assert_eq!(porter_stem("loving"), "love");
        assert_eq!(porter_stem("hate"), "hate");
        assert_eq!(porter_stem("hated"), "hate");
    }

    #[test]
    fn short_and_non_alphabetic_tokens_unchanged() {
        assert_eq!(porter_stem("is"), "is");
        assert_eq!(porter_stem("2024"), "2024");
        assert_eq!(porter_stem("abc123"), "abc123");
        assert_eq!(porter_stem("Loved"), "Loved");
    }

    #[test]
    fn fixpoint_is_stable() {
        for word in ["agreed", "generalizations", "conflated", "happiness", "ones"] {
            let once = stem_to_fixpoint(word);
            assert_eq!(stem_to_fixpoint(&once), once, "fixpoint of {word}");
            assert_eq!(porter_stem(&once), once);
        }
        assert_eq!(stem_to_fixpoint("agreed"), "agr");
    }
}
