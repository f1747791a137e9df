//! Color themes for the file view.
//!
//! A `Theme` pairs the ratatui colors gitwhere draws itself (gutter, focus
//! line, border) with the name of the syntect theme used for the code.
//!
//! - `dark`: ANSI 16 colors, works on any terminal.
//! - `catppuccin_mocha`: Catppuccin Mocha palette in RGB; requires truecolor.

use ratatui::style::Color;

#[derive(Debug, Clone)]
pub struct Theme {
    /// Line numbers outside the focus line.
    pub gutter: Color,
    /// Line number of the tracked line.
    pub focus_fg: Color,
    /// Background of the tracked line.
    pub focus_bg: Color,
    pub border: Color,
    pub title: Color,
    /// Title color when the view shows the last place of a lost line.
    pub lost: Color,
    /// syntect theme from `ThemeSet::load_defaults`.
    pub syntax_theme: &'static str,
}

impl Theme {
    /// Built-in dark theme using ANSI 16 colors.
    pub fn dark() -> Self {
        Self {
            gutter: Color::DarkGray,
            focus_fg: Color::Black,
            focus_bg: Color::Green,
            border: Color::DarkGray,
            title: Color::Cyan,
            lost: Color::Red,
            syntax_theme: "base16-ocean.dark",
        }
    }

    /// Catppuccin Mocha using RGB truecolor values.
    ///
    /// Palette source: <https://github.com/catppuccin/catppuccin> Mocha variant.
    pub fn catppuccin_mocha() -> Self {
        let green = Color::Rgb(166, 227, 161); // #a6e3a1
        let red = Color::Rgb(243, 139, 168); // #f38ba8
        let lavender = Color::Rgb(180, 190, 254); // #b4befe
        let overlay1 = Color::Rgb(127, 132, 156); // #7f849c
        let surface1 = Color::Rgb(69, 71, 90); // #45475a
        let base = Color::Rgb(30, 30, 46); // #1e1e2e

        Self {
            gutter: overlay1,
            focus_fg: base,
            focus_bg: green,
            border: surface1,
            title: lavender,
            lost: red,
            syntax_theme: "base16-mocha.dark",
        }
    }

    /// Resolves a theme name from config or flags.
    ///
    /// Unknown names fall back to `dark()` with a warning, so a typo never
    /// stops a run.
    pub fn from_name(name: &str) -> Self {
        match name {
            "catppuccin-mocha" | "catppuccin_mocha" => Self::catppuccin_mocha(),
            "dark" => Self::dark(),
            other => {
                tracing::warn!(theme = other, "unknown theme, falling back to 'dark'");
                Self::dark()
            }
        }
    }
}
