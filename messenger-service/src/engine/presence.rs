use std::collections::HashSet;

use super::views::UserStatus;

/// Room a user's connections join at handshake.
pub fn room_key(user_id: i64) -> String {
    user_id.to_string()
}

/// Online status of each user, judged by whether their room is among
/// `active_rooms`. Order and duplicates of `user_ids` are preserved.
pub fn statuses<I>(user_ids: I, active_rooms: &[String]) -> Vec<UserStatus>
where
    I: IntoIterator<Item = i64>,
{
    let active: HashSet<&str> = active_rooms.iter().map(String::as_str).collect();
    user_ids
        .into_iter()
        .map(|id| UserStatus {
            id,
            online: active.contains(room_key(id).as_str()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn room_key_is_decimal_id() {
        assert_eq!(room_key(12), "12");
    }

    #[test]
    fn online_iff_room_active() {
        let result = statuses([12, 30], &rooms(&["12", "7"]));
        assert_eq!(
            result,
            vec![
                UserStatus { id: 12, online: true },
                UserStatus { id: 30, online: false },
            ]
        );
    }

    #[test]
    fn socket_id_rooms_do_not_count() {
        // Every socket also sits in a room named after its own sid.
        let result = statuses([12], &rooms(&["ZxXkP0w9", "120"]));
        assert!(!result[0].online);
    }

    #[test]
    fn no_counterparts_no_statuses() {
        assert!(statuses(Vec::new(), &rooms(&["12"])).is_empty());
    }
}
