use scraper::ElementRef;

/// Compiles a CSS selector once and hands out a `&'static Selector`.
macro_rules! selector {
    ($query:expr) => {{
        static SELECTOR: once_cell::sync::Lazy<scraper::Selector> =
            once_cell::sync::Lazy::new(|| {
                scraper::Selector::parse($query).expect("static selector is valid CSS")
            });
        &*SELECTOR
    }};
}
pub(crate) use selector;

pub mod events;
pub mod major_events;

/// Element text with whitespace runs collapsed to single spaces.
pub(crate) fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
