use regex::Regex;

lazy_static::lazy_static! {
    // RFC 5646 language tags, plus the private use and grandfathered forms
    static ref BCP47: Regex = Regex::new(
        r"(?x)^(?:
            (?:
                (?P<language>[a-zA-Z]{2,3}(?:-[a-zA-Z]{3}){0,3}|[a-zA-Z]{4}|[a-zA-Z]{5,8})
                (?:-[a-zA-Z]{4})?
                (?:-(?:[a-zA-Z]{2}|[0-9]{3}))?
                (?:-(?:[a-zA-Z0-9]{5,8}|[0-9][a-zA-Z0-9]{3}))*
                (?:-[0-9a-wyzA-WYZ](?:-[a-zA-Z0-9]{2,8})+)*
                (?:-[xX](?:-[a-zA-Z0-9]{1,8})+)?
            )
            |[xX](?:-[a-zA-Z0-9]{1,8})+
            |[iI]-(?:ami|bnn|default|enochian|hak|klingon|lux|mingo|navajo|pwn|tao|tay|tsu)
            |(?:art-lojban|cel-gaulish|no-bok|no-nyn|zh-guoyu|zh-hakka|zh-min|zh-min-nan|zh-xiang)
            |en-GB-oed|sgn-BE-FR|sgn-BE-NL|sgn-CH-DE
        )$"
    )
    .unwrap();
}

/// True for well-formed BCP 47 language tags. `und` is accepted.
pub fn is_valid_language_tag(tag: &str) -> bool {
    BCP47.is_match(tag)
}
