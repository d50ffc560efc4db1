//! Form controls: reading the current field set and editing it the way a
//! user at the page would.

pub mod request;

pub use request::{Field, FieldValue, FilePart, Method, RequestError, SubmissionRequest};

use crate::dom::{Element, Node};

/// Files selected in `<input type="file">` controls, keyed by control name.
pub type FileList = Vec<(String, FilePart)>;

/// The primary form: its element plus whatever files have been picked.
#[derive(Debug, Clone)]
pub struct Form {
    pub element: Element,
    pub files: FileList,
}

impl Form {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            files: Vec::new(),
        }
    }

    pub fn set_field(&mut self, name: &str, value: &str) -> bool {
        set_field(&mut self.element, name, value)
    }

    pub fn set_checked(&mut self, name: &str, value: &str, checked: bool) -> bool {
        set_checked(&mut self.element, name, value, checked)
    }

    pub fn attach_file(&mut self, name: &str, file: FilePart) {
        self.files.push((name.to_string(), file));
    }

    pub fn clear_files(&mut self, name: &str) {
        self.files.retain(|(n, _)| n != name);
    }

    pub fn fields(&self) -> Vec<Field> {
        snapshot_fields(&self.element, Some(&self.files))
    }
}

fn is_control(el: &Element) -> bool {
    ["input", "select", "textarea", "button"]
        .iter()
        .any(|tag| el.is(tag))
}

fn input_type(el: &Element) -> String {
    el.attr("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

fn is_checkable(el: &Element) -> bool {
    el.is("input") && matches!(input_type(el).as_str(), "checkbox" | "radio")
}

/// Value a checkbox or radio submits when checked.
fn checkable_value(el: &Element) -> &str {
    el.attr("value").unwrap_or("on")
}

/// The successful controls of `form` in document order.
pub fn snapshot_fields(form: &Element, files: Option<&FileList>) -> Vec<Field> {
    let mut out = Vec::new();
    for control in form.descendants().into_iter().filter(|el| is_control(el)) {
        if control.has_attr("disabled") || control.is("button") {
            continue;
        }
        let name = match control.attr("name") {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };

        if control.is("select") {
            for value in selected_options(control) {
                out.push(Field::text(name, value));
            }
            continue;
        }

        if control.is("textarea") {
            out.push(Field::text(name, control.text_content()));
            continue;
        }

        match input_type(control).as_str() {
            "button" | "submit" | "reset" | "image" => {}
            "checkbox" | "radio" => {
                if control.has_attr("checked") {
                    out.push(Field::text(name, checkable_value(control)));
                }
            }
            "file" => {
                // An input with nothing picked contributes no part.
                for (_, part) in files.into_iter().flatten().filter(|(n, _)| n == name) {
                    out.push(Field {
                        name: name.to_string(),
                        value: FieldValue::File(part.clone()),
                    });
                }
            }
            _ => out.push(Field::text(name, control.attr("value").unwrap_or(""))),
        }
    }
    out
}

fn option_value(option: &Element) -> String {
    match option.attr("value") {
        Some(v) => v.to_string(),
        None => option.text_content().trim().to_string(),
    }
}

fn selected_options(select: &Element) -> Vec<String> {
    let options: Vec<&Element> = select
        .descendants()
        .into_iter()
        .filter(|el| el.is("option") && !el.has_attr("disabled"))
        .collect();
    let selected: Vec<String> = options
        .iter()
        .filter(|o| o.has_attr("selected"))
        .map(|o| option_value(o))
        .collect();

    if select.has_attr("multiple") {
        return selected;
    }
    match selected.into_iter().last() {
        Some(v) => vec![v],
        None => options.first().map(|o| option_value(o)).into_iter().collect(),
    }
}

fn controls_named_mut<'a>(el: &'a mut Element, name: &str, out: &mut Vec<&'a mut Element>) {
    for child in el.children.iter_mut() {
        if let Node::Element(child) = child {
            if is_control(child) && child.attr("name") == Some(name) {
                out.push(child);
            } else {
                controls_named_mut(child, name, out);
            }
        }
    }
}

/// Sets the value of the first text-like control, textarea or select named
/// `name`. Returns false when there is no such control.
pub fn set_field(form: &mut Element, name: &str, value: &str) -> bool {
    let mut controls = Vec::new();
    controls_named_mut(form, name, &mut controls);
    let Some(control) = controls.into_iter().find(|c| !is_checkable(c)) else {
        return false;
    };

    if control.is("textarea") {
        control.children = vec![Node::text(value)];
        return true;
    }

    if control.is("select") {
        let multiple = control.has_attr("multiple");
        let mut found = false;
        for option in option_elements_mut(control) {
            if option_value(option) == value {
                option.set_attr("selected", "");
                found = true;
            } else if !multiple {
                option.remove_attr("selected");
            }
        }
        return found;
    }

    control.set_attr("value", value);
    true
}

fn option_elements_mut(el: &mut Element) -> Vec<&mut Element> {
    let mut out = Vec::new();
    for child in el.children.iter_mut() {
        if let Node::Element(child) = child {
            if child.is("option") {
                out.push(child);
            } else {
                out.extend(option_elements_mut(child));
            }
        }
    }
    out
}

/// Checks or unchecks the checkbox/radio named `name` whose value is
/// `value`. Checking a radio unchecks the rest of its group.
pub fn set_checked(form: &mut Element, name: &str, value: &str, checked: bool) -> bool {
    let mut controls = Vec::new();
    controls_named_mut(form, name, &mut controls);
    let mut found = false;
    for control in controls.into_iter().filter(|c| is_checkable(c)) {
        let radio = input_type(control) == "radio";
        if checkable_value(control) == value {
            found = true;
            if checked {
                control.set_attr("checked", "");
            } else {
                control.remove_attr("checked");
            }
        } else if radio && checked {
            control.remove_attr("checked");
        }
    }
    found
}
