//! User-agent classification
//!
//! Case-insensitive substring matching, first match wins. Unrecognized or
//! empty input degrades to `desktop` / `Unknown`.

use crate::analytics::models::{ClientInfo, DeviceType, UNKNOWN};

const TABLET_MARKERS: &[&str] = &["tablet", "ipad", "playbook", "silk"];
const MOBILE_MARKERS: &[&str] = &[
    "mobile",
    "iphone",
    "ipod",
    "blackberry",
    "opera mini",
    "windows phone",
];

const BROWSERS: &[(&str, &str)] = &[
    ("firefox", "Firefox"),
    ("chrome", "Chrome"),
    ("safari", "Safari"),
    ("edge", "Edge"),
    ("opera", "Opera"),
];

const OPERATING_SYSTEMS: &[(&[&str], &str)] = &[
    (&["windows"], "Windows"),
    (&["mac"], "macOS"),
    (&["linux"], "Linux"),
    (&["android"], "Android"),
    (&["ios", "iphone", "ipad"], "iOS"),
];

/// Classify a raw user-agent string into device type, browser and OS
pub fn classify(user_agent: &str) -> ClientInfo {
    let ua = user_agent.to_lowercase();

    ClientInfo {
        device_type: device_type(&ua),
        browser: browser(&ua),
        os: operating_system(&ua),
    }
}

fn device_type(ua: &str) -> DeviceType {
    if TABLET_MARKERS.iter().any(|m| ua.contains(m)) || is_android_tablet(ua) {
        DeviceType::Tablet
    } else if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) || ua.contains("android") {
        // Android reaching this branch always has "mobi" after it
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// `android` with no `mobi` anywhere after some occurrence of it
fn is_android_tablet(ua: &str) -> bool {
    ua.match_indices("android")
        .any(|(idx, m)| !ua[idx + m.len()..].contains("mobi"))
}

fn browser(ua: &str) -> &'static str {
    BROWSERS
        .iter()
        .find(|(needle, _)| ua.contains(needle))
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN)
}

fn operating_system(ua: &str) -> &'static str {
    OPERATING_SYSTEMS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| ua.contains(n)))
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const WINDOWS_FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const MAC_EDGE: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

    #[test]
    fn ipad_is_always_a_tablet() {
        let info = classify(IPAD);
        assert_eq!(info.device_type, DeviceType::Tablet);
        // "like Mac OS X" matches before the iOS markers
        assert_eq!(info.os, "macOS");
        assert_eq!(info.browser, "Safari");

        assert_eq!(
            classify("mobile iphone ipad blackberry").device_type,
            DeviceType::Tablet
        );
    }

    #[test]
    fn android_tablet_versus_phone() {
        assert_eq!(classify(ANDROID_TABLET).device_type, DeviceType::Tablet);
        assert_eq!(classify(ANDROID_PHONE).device_type, DeviceType::Mobile);
        assert_eq!(classify("android").device_type, DeviceType::Tablet);
        assert_eq!(classify("Android; MOBILE").device_type, DeviceType::Mobile);
        assert_eq!(classify("Android mobi").device_type, DeviceType::Mobile);
        assert_eq!(classify("android tablet; mobi").device_type, DeviceType::Tablet);
    }

    #[test]
    fn mobi_before_android_does_not_count() {
        assert_eq!(classify("mobi android").device_type, DeviceType::Tablet);
    }

    #[test]
    fn iphone_is_mobile() {
        let info = classify(IPHONE);
        assert_eq!(info.device_type, DeviceType::Mobile);
        assert_eq!(info.browser, "Safari");
    }

    #[test]
    fn browser_priority_follows_declaration_order() {
        assert_eq!(classify(WINDOWS_FIREFOX).browser, "Firefox");
        // Edge UAs also advertise Chrome, which wins
        assert_eq!(classify(MAC_EDGE).browser, "Chrome");
        assert_eq!(classify("Opera/9.80 (J2ME/MIDP)").browser, "Opera");
    }

    #[test]
    fn os_detection() {
        assert_eq!(classify(WINDOWS_FIREFOX).os, "Windows");
        assert_eq!(classify(MAC_EDGE).os, "macOS");
        // Android UAs carry "Linux" first
        assert_eq!(classify(ANDROID_PHONE).os, "Linux");
        assert_eq!(classify("Dalvik/2.1.0 (Android 14)").os, "Android");
        assert_eq!(classify("CFNetwork iOS").os, "iOS");
    }

    #[test]
    fn empty_input_degrades_to_defaults() {
        let info = classify("");
        assert_eq!(info.device_type, DeviceType::Desktop);
        assert_eq!(info.browser, UNKNOWN);
        assert_eq!(info.os, UNKNOWN);
    }
}
