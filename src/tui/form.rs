use crate::command::{InferenceForm, TrainingForm};
use crate::model::ModelType;
use crossterm::event::{KeyCode, KeyModifiers};

/// Mutable handle on one form row.
pub enum FieldMut<'a> {
    Choice(&'a mut Option<ModelType>),
    Text(&'a mut String),
    Toggle(&'a mut bool),
    Run,
}

/// Read-only view of one form row, for drawing.
pub enum FieldView<'a> {
    Choice(Option<ModelType>),
    Text(&'a str),
    Toggle(bool),
    Run,
}

/// A form the TUI can edit row by row. The last row is always the run button.
pub trait EditableForm {
    fn labels(&self) -> &'static [&'static str];
    fn field_mut(&mut self, idx: usize) -> FieldMut<'_>;
    fn field_view(&self, idx: usize) -> FieldView<'_>;

    fn len(&self) -> usize {
        self.labels().len()
    }
}

const TRAINING_LABELS: [&str; 9] = [
    "Model type",
    "Config file",
    "Start checkpoint",
    "Results path",
    "Data paths (;-separated)",
    "Validation paths (;-separated)",
    "Number of workers",
    "Device IDs",
    "[ Start Training ]",
];

const INFERENCE_LABELS: [&str; 7] = [
    "Model type",
    "Config file",
    "Start checkpoint",
    "Input folder",
    "Output folder",
    "Extract instrumental",
    "[ Run Inference ]",
];

impl EditableForm for TrainingForm {
    fn labels(&self) -> &'static [&'static str] {
        &TRAINING_LABELS
    }

    fn field_mut(&mut self, idx: usize) -> FieldMut<'_> {
        match idx {
            0 => FieldMut::Choice(&mut self.model_type),
            1 => FieldMut::Text(&mut self.config_path),
            2 => FieldMut::Text(&mut self.start_checkpoint),
            3 => FieldMut::Text(&mut self.results_path),
            4 => FieldMut::Text(&mut self.data_paths),
            5 => FieldMut::Text(&mut self.valid_paths),
            6 => FieldMut::Text(&mut self.num_workers),
            7 => FieldMut::Text(&mut self.device_ids),
            _ => FieldMut::Run,
        }
    }

    fn field_view(&self, idx: usize) -> FieldView<'_> {
        match idx {
            0 => FieldView::Choice(self.model_type),
            1 => FieldView::Text(&self.config_path),
            2 => FieldView::Text(&self.start_checkpoint),
            3 => FieldView::Text(&self.results_path),
            4 => FieldView::Text(&self.data_paths),
            5 => FieldView::Text(&self.valid_paths),
            6 => FieldView::Text(&self.num_workers),
            7 => FieldView::Text(&self.device_ids),
            _ => FieldView::Run,
        }
    }
}

impl EditableForm for InferenceForm {
    fn labels(&self) -> &'static [&'static str] {
        &INFERENCE_LABELS
    }

    fn field_mut(&mut self, idx: usize) -> FieldMut<'_> {
        match idx {
            0 => FieldMut::Choice(&mut self.model_type),
            1 => FieldMut::Text(&mut self.config_path),
            2 => FieldMut::Text(&mut self.start_checkpoint),
            3 => FieldMut::Text(&mut self.input_folder),
            4 => FieldMut::Text(&mut self.store_dir),
            5 => FieldMut::Toggle(&mut self.extract_instrumental),
            _ => FieldMut::Run,
        }
    }

    fn field_view(&self, idx: usize) -> FieldView<'_> {
        match idx {
            0 => FieldView::Choice(self.model_type),
            1 => FieldView::Text(&self.config_path),
            2 => FieldView::Text(&self.start_checkpoint),
            3 => FieldView::Text(&self.input_folder),
            4 => FieldView::Text(&self.store_dir),
            5 => FieldView::Toggle(self.extract_instrumental),
            _ => FieldView::Run,
        }
    }
}

/// What a key press did to a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Edited,
    Submit,
    /// Not a form key; the caller may treat it as a global shortcut.
    Ignored,
}

/// Apply one key press to `form` with the cursor on row `focus`.
pub fn handle_form_key<F: EditableForm + ?Sized>(
    form: &mut F,
    focus: &mut usize,
    modifiers: KeyModifiers,
    code: KeyCode,
) -> FormAction {
    let last = form.len().saturating_sub(1);
    match code {
        KeyCode::Up => {
            *focus = focus.saturating_sub(1);
            return FormAction::Edited;
        }
        KeyCode::Down => {
            *focus = (*focus + 1).min(last);
            return FormAction::Edited;
        }
        _ => {}
    }

    match (form.field_mut(*focus), code) {
        (FieldMut::Run, KeyCode::Enter) => FormAction::Submit,
        (FieldMut::Choice(m), KeyCode::Left) => {
            *m = ModelType::cycle(*m, false);
            FormAction::Edited
        }
        (FieldMut::Choice(m), KeyCode::Right) => {
            *m = ModelType::cycle(*m, true);
            FormAction::Edited
        }
        (FieldMut::Toggle(b), KeyCode::Char(' ')) => {
            *b = !*b;
            FormAction::Edited
        }
        (FieldMut::Text(s), KeyCode::Char('u')) if modifiers.contains(KeyModifiers::CONTROL) => {
            s.clear();
            FormAction::Edited
        }
        (FieldMut::Text(s), KeyCode::Char(c)) if !modifiers.contains(KeyModifiers::CONTROL) => {
            s.push(c);
            FormAction::Edited
        }
        (FieldMut::Text(s), KeyCode::Backspace) => {
            s.pop();
            FormAction::Edited
        }
        // Enter on an input row moves on, like tabbing through a dialog
        (FieldMut::Text(_), KeyCode::Enter)
        | (FieldMut::Choice(_), KeyCode::Enter)
        | (FieldMut::Toggle(_), KeyCode::Enter) => {
            *focus = (*focus + 1).min(last);
            FormAction::Edited
        }
        _ => FormAction::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(form: &mut impl EditableForm, focus: &mut usize, code: KeyCode) -> FormAction {
        handle_form_key(form, focus, KeyModifiers::NONE, code)
    }

    #[test]
    fn typing_edits_the_focused_text_field() {
        let mut form = TrainingForm::default();
        let mut focus = 1;
        for c in "cfg.yam".chars() {
            press(&mut form, &mut focus, KeyCode::Char(c));
        }
        press(&mut form, &mut focus, KeyCode::Char('x'));
        press(&mut form, &mut focus, KeyCode::Backspace);
        press(&mut form, &mut focus, KeyCode::Char('l'));
        assert_eq!(form.config_path, "cfg.yaml");

        handle_form_key(&mut form, &mut focus, KeyModifiers::CONTROL, KeyCode::Char('u'));
        assert!(form.config_path.is_empty());
    }

    #[test]
    fn arrows_cycle_model_type_and_move_focus() {
        let mut form = InferenceForm::default();
        let mut focus = 0;
        press(&mut form, &mut focus, KeyCode::Right);
        press(&mut form, &mut focus, KeyCode::Right);
        assert_eq!(form.model_type, Some(ModelType::Htdemucs));
        press(&mut form, &mut focus, KeyCode::Left);
        assert_eq!(form.model_type, Some(ModelType::Mdx23c));

        press(&mut form, &mut focus, KeyCode::Up);
        assert_eq!(focus, 0);
        for _ in 0..20 {
            press(&mut form, &mut focus, KeyCode::Down);
        }
        assert_eq!(focus, form.len() - 1);
    }

    #[test]
    fn space_toggles_and_enter_on_run_row_submits() {
        let mut form = InferenceForm::default();
        let mut focus = 5;
        press(&mut form, &mut focus, KeyCode::Char(' '));
        assert!(form.extract_instrumental);

        assert_eq!(press(&mut form, &mut focus, KeyCode::Enter), FormAction::Edited);
        assert_eq!(focus, 6);
        assert_eq!(press(&mut form, &mut focus, KeyCode::Enter), FormAction::Submit);
        assert_eq!(press(&mut form, &mut focus, KeyCode::Char('q')), FormAction::Ignored);
    }
}
