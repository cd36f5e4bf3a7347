//! Themed capture pages.
//!
//! The themes are purely presentational: each route pre-seeds the page
//! with an event name and a CSS class, nothing else changes.

pub const PAGE_TEMPLATE: &str = include_str!("../assets/index.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Default,
    Wedding,
    Party,
}

impl Theme {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Default => "Pam Production Orlando",
            Self::Wedding => "Wedding Memories",
            Self::Party => "Party Memories",
        }
    }

    /// CSS class on the page body.
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Wedding => "wedding",
            Self::Party => "party",
        }
    }
}

/// Substitute the theme into the page template.
pub fn render(theme: Theme) -> String {
    PAGE_TEMPLATE
        .replace("{{event_name}}", theme.event_name())
        .replace("{{theme}}", theme.css_class())
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_event_name() {
        let page = render(Theme::Wedding);
        assert!(page.contains("Wedding Memories"));
        assert!(page.contains("class=\"wedding\""));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn test_default_theme() {
        let page = render(Theme::Default);
        assert!(page.contains("Pam Production Orlando"));
        assert!(page.contains("class=\"default\""));
    }
}
