/// Проверить, подходит ли topic под MQTT topic filter (`+`, `#`).
///
/// Topic'и на `$` (например `$SYS/...`) не матчатся wildcard'ом
/// на первом уровне, как требует MQTT 3.1.1 §4.7.2.
pub fn matches(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
