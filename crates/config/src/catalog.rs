//! Package catalog: the base desktop set plus optional applications

use lunaris_errors::ConfigError;

/// An optional application the user may add to the installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageOption {
    /// Stable identifier used on the command line
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub packages: &'static [&'static str],
    pub default: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PackageCategory {
    pub name: &'static str,
    pub description: &'static str,
    pub options: &'static [PackageOption],
}

/// Packages installed on every run
pub const BASE_PACKAGES: &[&str] = &[
    "hyprland", "axel", "bc", "coreutils", "cliphist", "cmake", "curl", "rofi-wayland",
    "rsync", "wget", "ripgrep", "jq", "npm", "meson", "typescript", "gjs", "xdg-user-dirs",
    "brightnessctl", "ddcutil", "pavucontrol", "wireplumber", "libdbusmenu-gtk3", "playerctl",
    "swww", "git", "gobject-introspection", "glib2-devel", "gvfs", "glib2", "glibc", "gtk3",
    "gtk-layer-shell", "libpulse", "pam", "gnome-bluetooth-3.0", "gammastep", "libsoup3",
    "libnotify", "networkmanager", "power-profiles-daemon", "upower", "adw-gtk-theme-git",
    "qt5ct", "qt5-wayland", "fontconfig", "ttf-readex-pro", "ttf-jetbrains-mono-nerd",
    "ttf-material-symbols-variable-git", "apple-fonts", "ttf-space-mono-nerd", "ttf-rubik-vf",
    "ttf-gabarito-git", "fish", "foot", "starship", "polkit-gnome", "gnome-keyring",
    "gnome-control-center", "blueberry", "webp-pixbuf-loader", "gtksourceview3", "yad",
    "ydotool", "xdg-user-dirs-gtk", "tinyxml2", "gtkmm3", "gtksourceviewmm", "cairomm",
    "xdg-desktop-portal", "xdg-desktop-portal-gtk", "xdg-desktop-portal-hyprland", "gradience",
    "python-libsass", "python-pywalfox", "matugen-bin", "python-build", "python-pillow",
    "python-pywal", "python-setuptools-scm", "python-wheel", "swappy", "wf-recorder", "grim",
    "tesseract", "tesseract-data-eng", "slurp", "dart-sass", "python-pywayland",
    "python-psutil", "hypridle", "hyprutils", "hyprlock", "wlogout", "wl-clipboard",
    "hyprpicker", "ghostty", "ttf-noto-sans-cjk-vf", "noto-fonts-emoji", "metar",
];

const fn option(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    packages: &'static [&'static str],
    default: bool,
) -> PackageOption {
    PackageOption {
        id,
        name,
        description,
        packages,
        default,
    }
}

pub const CATEGORIES: &[PackageCategory] = &[
    PackageCategory {
        name: "Terminals",
        description: "Terminal emulators",
        options: &[
            option("alacritty", "Alacritty", "A fast, cross-platform, OpenGL terminal emulator", &["alacritty"], true),
            option("kitty", "Kitty", "A modern, hackable, featureful, OpenGL-based terminal emulator", &["kitty"], false),
            option("foot", "Foot", "A fast, lightweight and minimalistic Wayland terminal emulator", &["foot"], false),
        ],
    },
    PackageCategory {
        name: "Shells",
        description: "Command-line shells",
        options: &[
            option("zsh", "Zsh", "A powerful shell with many features", &["zsh", "zsh-completions", "zsh-syntax-highlighting", "zsh-autosuggestions"], true),
            option("fish", "Fish", "A smart and user-friendly command line shell", &["fish"], false),
            option("bash", "Bash", "The default shell for most Linux distributions", &["bash", "bash-completion"], false),
        ],
    },
    PackageCategory {
        name: "Browsers",
        description: "Web browsers",
        options: &[
            option("firefox", "Firefox", "A free and open-source web browser", &["firefox"], true),
            option("chromium", "Chromium", "The open-source project behind Google Chrome", &["chromium"], false),
            option("brave", "Brave", "A privacy-focused web browser", &["brave-bin"], false),
        ],
    },
    PackageCategory {
        name: "File Managers",
        description: "File managers",
        options: &[
            option("thunar", "Thunar", "The Xfce file manager", &["thunar", "thunar-archive-plugin", "thunar-volman", "tumbler"], true),
            option("dolphin", "Dolphin", "The KDE Plasma file manager", &["dolphin"], false),
            option("nautilus", "Nautilus", "The GNOME file manager", &["nautilus"], false),
        ],
    },
    PackageCategory {
        name: "Text Editors",
        description: "Text editors",
        options: &[
            option("neovim", "Neovim", "Hyperextensible Vim-based text editor", &["neovim"], true),
            option("vscode", "Visual Studio Code", "Code editing. Redefined.", &["visual-studio-code-bin"], false),
            option("gedit", "Gedit", "The GNOME text editor", &["gedit"], false),
        ],
    },
    PackageCategory {
        name: "Media Players",
        description: "Media players",
        options: &[
            option("vlc", "VLC", "A cross-platform multimedia player", &["vlc"], true),
            option("mpv", "MPV", "A free, open source, and cross-platform media player", &["mpv"], false),
            option("celluloid", "Celluloid", "A simple GTK frontend for mpv", &["celluloid"], false),
        ],
    },
];

/// Look up an option by id (case-insensitive).
#[must_use]
pub fn find_option(id: &str) -> Option<&'static PackageOption> {
    CATEGORIES
        .iter()
        .flat_map(|category| category.options.iter())
        .find(|option| option.id.eq_ignore_ascii_case(id))
}

/// Ids of the options selected when the user makes no choice.
#[must_use]
pub fn default_selection() -> Vec<&'static str> {
    CATEGORIES
        .iter()
        .flat_map(|category| category.options.iter())
        .filter(|option| option.default)
        .map(|option| option.id)
        .collect()
}

/// Build the initial install queue.
///
/// Order is `base`, then the selected options in catalog order, then `extra`.
/// Duplicates keep their first position.
///
/// # Errors
///
/// Returns `ConfigError::UnknownOption` if a selected id is not in the catalog.
pub fn build_queue(
    base: &[String],
    selected: &[String],
    extra: &[String],
) -> Result<Vec<String>, ConfigError> {
    for id in selected {
        if find_option(id).is_none() {
            return Err(ConfigError::UnknownOption { option: id.clone() });
        }
    }

    let mut queue: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.trim();
        if !name.is_empty() && !queue.iter().any(|queued| queued == name) {
            queue.push(name.to_string());
        }
    };

    for name in base {
        push(name);
    }
    for category in CATEGORIES {
        for option in category.options {
            if selected.iter().any(|id| id.eq_ignore_ascii_case(option.id)) {
                for name in option.packages {
                    push(name);
                }
            }
        }
    }
    for name in extra {
        push(name);
    }

    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_list_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for name in BASE_PACKAGES {
            assert!(seen.insert(*name), "duplicate base package {name}");
        }
    }

    #[test]
    fn queue_deduplicates_preserving_first_position() {
        let base = vec!["git".to_string(), "foot".to_string()];
        let selected = vec!["foot".to_string(), "kitty".to_string()];
        let extra = vec!["git".to_string(), "htop".to_string()];

        let queue = build_queue(&base, &selected, &extra).unwrap();
        assert_eq!(queue, ["git", "foot", "kitty", "htop"]);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = build_queue(&[], &["emacs".to_string()], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn defaults_pick_one_option_per_category() {
        assert_eq!(default_selection().len(), CATEGORIES.len());
    }
}
