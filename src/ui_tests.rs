#[cfg(test)]
mod tests {
    use crate::ui::{to_value, Button, Column, Dialog, NumberPicker, Text, TextInput};
    use serde_json::json;

    #[test]
    fn text_input_omits_unset_fields() {
        let input = TextInput::new("password")
            .hint("Password")
            .password(true)
            .single_line(true);
        let val = to_value(input);
        assert_eq!(val.get("bind_key").and_then(|v| v.as_str()), Some("password"));
        assert_eq!(val.get("password").and_then(|v| v.as_bool()), Some(true));
        assert!(val.get("error").is_none());
        assert!(val.get("ime_action").is_none());
    }

    #[test]
    fn number_picker_clamps_initial_value() {
        let val = to_value(NumberPicker::new("page", 1, 3).value(9));
        assert_eq!(val.get("value").and_then(|v| v.as_u64()), Some(3));
        let val = to_value(NumberPicker::new("page", 1, 3).value(0));
        assert_eq!(val.get("value").and_then(|v| v.as_u64()), Some(1));
    }

    #[test]
    fn dialog_defaults_to_cancelable_and_nests_buttons() {
        let dialog = Dialog::new(vec![json!({"type": "Text", "text": "row"})])
            .id("d")
            .positive(Button::new("OK", "ok").enabled(false));
        let val = to_value(dialog);
        assert_eq!(val.get("cancelable").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(val.pointer("/positive/action").and_then(|v| v.as_str()), Some("ok"));
        assert!(val.get("negative").is_none());
    }

    #[test]
    fn column_and_bold_text_serialize() {
        let col = Column::new(vec![to_value(Text::new("Title:\nX").bold_until(5))]).padding(8);
        let val = to_value(col);
        assert_eq!(val.get("padding").and_then(|v| v.as_u64()), Some(8));
        assert_eq!(
            val.pointer("/children/0/bold_until").and_then(|v| v.as_u64()),
            Some(5)
        );
    }
}
