//! Embedded fingerprint profiles.
//!
//! Each profile is internally consistent: the user agent, platform hint,
//! languages, viewport, and WebGL strings all describe the same plausible
//! machine. Mixing fields across profiles is exactly the correlation
//! anti-bot vendors look for.

/// One coherent browser fingerprint.
pub struct FingerprintProfile {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub locale: &'static str,
    pub timezone: &'static str,
    pub viewport: (u32, u32),
    pub platform_hint: &'static str,
    pub languages: &'static [&'static str],
    pub hardware_concurrency: u32,
    pub webgl_vendor: &'static str,
    pub webgl_renderer: &'static str,
}

/// Profile pool. Kept to recent, widely-deployed Chrome builds so the
/// user-agent never dates itself against the TLS/JS fingerprint.
pub const FINGERPRINT_PROFILES: &[FingerprintProfile] = &[
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept_language: "en-SG,en;q=0.9",
        locale: "en-SG",
        timezone: "Asia/Singapore",
        viewport: (1920, 1080),
        platform_hint: "Win32",
        languages: &["en-SG", "en"],
        hardware_concurrency: 8,
        webgl_vendor: "Google Inc. (NVIDIA)",
        webgl_renderer: "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept_language: "en-US,en;q=0.9",
        locale: "en-US",
        timezone: "Asia/Singapore",
        viewport: (1680, 1050),
        platform_hint: "MacIntel",
        languages: &["en-US", "en"],
        hardware_concurrency: 10,
        webgl_vendor: "Google Inc. (Apple)",
        webgl_renderer: "ANGLE (Apple, Apple M2, OpenGL 4.1)",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        accept_language: "en-MY,en;q=0.9,ms;q=0.8",
        locale: "en-MY",
        timezone: "Asia/Kuala_Lumpur",
        viewport: (1536, 864),
        platform_hint: "Linux x86_64",
        languages: &["en-MY", "en", "ms"],
        hardware_concurrency: 12,
        webgl_vendor: "Google Inc. (Intel)",
        webgl_renderer: "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630, OpenGL 4.6)",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        accept_language: "en-PH,en;q=0.9,fil;q=0.8",
        locale: "en-PH",
        timezone: "Asia/Manila",
        viewport: (1366, 768),
        platform_hint: "Win32",
        languages: &["en-PH", "en", "fil"],
        hardware_concurrency: 4,
        webgl_vendor: "Google Inc. (AMD)",
        webgl_renderer: "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
        accept_language: "en-ID,en;q=0.9,id;q=0.8",
        locale: "en-ID",
        timezone: "Asia/Jakarta",
        viewport: (1440, 900),
        platform_hint: "MacIntel",
        languages: &["en-ID", "en", "id"],
        hardware_concurrency: 8,
        webgl_vendor: "Google Inc. (Apple)",
        webgl_renderer: "ANGLE (Apple, Apple M1, OpenGL 4.1)",
    },
];
