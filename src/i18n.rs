//! Language selection for user-facing error messages.
//!
//! The locale is picked from `Accept-Language` once per request and kept in a
//! task-local, the same way the request id is carried.

use axum::{extract::Request, http::header, middleware::Next, response::Response};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Id,
}

impl Locale {
    /// Picks the first supported language tag, honouring q-weights.
    pub fn from_accept_language(value: &str) -> Self {
        let mut tags: Vec<(f32, &str)> = value
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.trim().split(';');
                let tag = pieces.next()?.trim();
                if tag.is_empty() {
                    return None;
                }
                let weight = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                Some((weight, tag))
            })
            .collect();
        tags.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        tags.into_iter()
            .find_map(|(_, tag)| {
                let primary = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
                match primary.as_str() {
                    "id" | "in" => Some(Locale::Id),
                    "en" => Some(Locale::En),
                    _ => None,
                }
            })
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Id => "id",
        }
    }
}

tokio::task_local! {
    static CURRENT_LOCALE: Locale;
}

pub async fn scope_locale<Fut, R>(locale: Locale, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_LOCALE.scope(locale, future).await
}

pub fn current_locale() -> Locale {
    CURRENT_LOCALE.try_with(|l| *l).unwrap_or_default()
}

pub async fn locale_middleware(request: Request, next: Next) -> Response {
    let locale = request
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(Locale::from_accept_language)
        .unwrap_or_default();

    scope_locale(locale, next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("id-ID,id;q=0.9,en;q=0.8", Locale::Id)]
    #[case("fr;q=1.0, en;q=0.5, id;q=0.4", Locale::En)]
    #[case("en;q=0.2, id;q=0.7", Locale::Id)]
    #[case("in", Locale::Id)]
    #[case("de-DE", Locale::En)]
    #[case("", Locale::En)]
    fn picks_highest_weighted_supported_language(#[case] header: &str, #[case] expected: Locale) {
        assert_eq!(Locale::from_accept_language(header), expected);
    }

    #[tokio::test]
    async fn locale_is_scoped_to_the_task() {
        assert_eq!(current_locale(), Locale::En);
        let inner = scope_locale(Locale::Id, async { current_locale() }).await;
        assert_eq!(inner, Locale::Id);
        assert_eq!(current_locale(), Locale::En);
    }
}
