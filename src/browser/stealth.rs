//! Stealth evasion JavaScript injected into every new document.
//!
//! The scripts read their fingerprint values from `window.__scoutProfile`,
//! which [`profile_bootstrap`] emits from the session's [`Identity`] so the
//! JS-visible fingerprint always matches the request signature.

use crate::identity::Identity;

/// Build the profile object script. Must be injected before any evasion
/// script runs.
#[must_use]
pub fn profile_bootstrap(identity: &Identity) -> String {
    format!(
        r#"
        window.__scoutProfile = {{
            platform: "{platform}",
            languages: {languages},
            hardwareConcurrency: {cores},
            webglVendor: "{vendor}",
            webglRenderer: "{renderer}",
            sessionSeed: "{seed}"
        }};
        "#,
        platform = identity.platform_hint,
        languages = serde_json::to_string(&identity.languages).unwrap_or_else(|_| "[]".to_string()),
        cores = identity.hardware_concurrency,
        vendor = identity.webgl_vendor,
        renderer = identity.webgl_renderer,
        seed = identity.session_seed,
    )
}

// Order matters: navigator basics first, API-level spoofs after.
pub const EVASION_SCRIPTS: &[&str] = &[
    // Remove the webdriver flag
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Chrome runtime object expected on real Chrome
    r#"
    window.chrome = window.chrome || {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Permissions API: notifications must mirror Notification.permission
    r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    // Plugin enumeration consistent with desktop Chrome
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // Languages and platform from the session profile
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => window.__scoutProfile.languages,
        configurable: true
    });
    Object.defineProperty(navigator, 'platform', {
        get: () => window.__scoutProfile.platform,
        configurable: true
    });
    Object.defineProperty(navigator, 'hardwareConcurrency', {
        get: () => window.__scoutProfile.hardwareConcurrency,
        configurable: true
    });
    "#,
    // ChromeDriver detection variables
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
    // WebGL vendor/renderer from the session profile
    r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) {
            return window.__scoutProfile.webglVendor;
        }
        if (parameter === 37446) {
            return window.__scoutProfile.webglRenderer;
        }
        return getParameter.call(this, parameter);
    };
    "#,
];
