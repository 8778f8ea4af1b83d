#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use quote_desk::catalog::{Catalog, CategoryField, SpecialLists};
use quote_desk::document::{LocalBackend, QuoteBackend};
use quote_desk::flatten::{flatten_data, unflatten_data, FlatMap};
use quote_desk::form::FormSection;
use quote_desk::logging::{self, LogGuard};
use quote_desk::oee::OeeFigures;
use quote_desk::session::{CollectionSummary, QuoteSession};
use quote_desk::settings::AppSettings;
use quote_desk::view_store::{ApplyReport, DocumentType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tauri::{AppHandle, Manager, State};
use tauri_plugin_opener::OpenerExt;

const APP_DIR: &str = "QuoteDesk";
const QUOTE_EXTENSION: &str = "json";
const DEFAULT_QUOTE_NAME: &str = "quote.json";

#[derive(Default)]
struct Desk {
    session: QuoteSession,
    backend: LocalBackend,
    path: Option<PathBuf>,
}

struct DeskState(Mutex<Desk>);

struct LogState(#[allow(dead_code)] Mutex<LogGuard>);

#[derive(Deserialize)]
struct QuoteTypeRequest {
    quote_type: Option<String>,
}

#[derive(Deserialize)]
struct FieldChangedRequest {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct EntryRequest {
    quote_type: Option<String>,
    collection: String,
    index: Option<u32>,
}

#[derive(Deserialize)]
struct ReconcileRequest {
    quote_type: Option<String>,
    collection: String,
    fields: FlatMap,
}

#[derive(Deserialize)]
struct ViewKeyRequest {
    quote_type: Option<String>,
    key: String,
}

#[derive(Deserialize)]
struct FlattenRequest {
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct UnflattenRequest {
    fields: FlatMap,
}

#[derive(Deserialize)]
struct FieldGetRequest {
    key: String,
}

#[derive(Deserialize)]
struct FieldSetRequest {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct QuoteSaveRequest {
    save_as: Option<bool>,
    filename: Option<String>,
}

#[derive(Serialize)]
struct CategorySummary {
    name: String,
    can_add: bool,
    fields: Vec<CategoryField>,
}

#[derive(Serialize)]
struct QuoteFormResult {
    quote_type: DocumentType,
    dirty: bool,
    path: Option<String>,
    sections: Vec<FormSection>,
    collections: Vec<CollectionSummary>,
}

#[derive(Serialize)]
struct FieldChangedResult {
    dirty: bool,
    oee: Option<OeeFigures>,
}

#[derive(Serialize)]
struct QuoteFileResult {
    ok: bool,
    canceled: bool,
    path: Option<String>,
    quote_type: Option<DocumentType>,
    error: Option<String>,
}

impl QuoteFileResult {
    fn canceled() -> Self {
        Self {
            ok: false,
            canceled: true,
            path: None,
            quote_type: None,
            error: None,
        }
    }

    fn failed(path: &Path, err: impl ToString) -> Self {
        Self {
            ok: false,
            canceled: false,
            path: Some(path.to_string_lossy().to_string()),
            quote_type: None,
            error: Some(err.to_string()),
        }
    }
}

#[tauri::command]
fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn platform_name() -> String {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        _ => "linux",
    }
    .to_string()
}

#[tauri::command]
fn quote_categories(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<Vec<CategorySummary>, String> {
    let desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    let categories = desk
        .backend
        .categories(doc_type)
        .into_iter()
        .map(|name| CategorySummary {
            can_add: desk.backend.category_can_add(name.as_str()),
            fields: desk.backend.category_fields(name.as_str()),
            name,
        })
        .collect();
    Ok(categories)
}

#[tauri::command]
fn quote_special_lists() -> SpecialLists {
    Catalog::quote().special_lists()
}

#[tauri::command]
fn quote_form(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<QuoteFormResult, String> {
    let desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    Ok(form_result(&desk, doc_type))
}

#[tauri::command]
fn quote_new(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<QuoteFormResult, String> {
    let mut guard = lock_desk(&state)?;
    let desk = &mut *guard;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .new_document(&mut desk.backend, doc_type)
        .map_err(|err| err.to_string())?;
    desk.path = None;
    Ok(form_result(desk, doc_type))
}

#[tauri::command]
fn quote_switch_type(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<QuoteFormResult, String> {
    let mut guard = lock_desk(&state)?;
    let desk = &mut *guard;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .switch_type(&desk.backend, doc_type)
        .map_err(|err| err.to_string())?;
    Ok(form_result(desk, doc_type))
}

#[tauri::command]
fn quote_field_changed(
    state: State<'_, DeskState>,
    payload: FieldChangedRequest,
) -> Result<FieldChangedResult, String> {
    let mut guard = lock_desk(&state)?;
    let desk = &mut *guard;
    let oee = desk
        .session
        .field_changed(&mut desk.backend, payload.key.as_str(), payload.value.as_str())
        .map_err(|err| err.to_string())?;
    Ok(FieldChangedResult {
        dirty: desk.session.is_dirty(),
        oee,
    })
}

#[tauri::command]
fn quote_entry_add(
    state: State<'_, DeskState>,
    payload: EntryRequest,
) -> Result<QuoteFormResult, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .add_entry(doc_type, payload.collection.as_str())
        .map_err(|err| err.to_string())?;
    Ok(form_result(&desk, doc_type))
}

#[tauri::command]
fn quote_entry_delete(
    state: State<'_, DeskState>,
    payload: EntryRequest,
) -> Result<QuoteFormResult, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    let Some(index) = payload.index else {
        return Err("Entry index is required.".to_string());
    };
    desk.session
        .delete_entry(doc_type, payload.collection.as_str(), index)
        .map_err(|err| err.to_string())?;
    Ok(form_result(&desk, doc_type))
}

#[tauri::command]
fn quote_reconcile(
    state: State<'_, DeskState>,
    payload: ReconcileRequest,
) -> Result<QuoteFormResult, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .reconcile(doc_type, payload.collection.as_str(), &payload.fields)
        .map_err(|err| err.to_string())?;
    Ok(form_result(&desk, doc_type))
}

#[tauri::command]
fn view_register(state: State<'_, DeskState>, payload: ViewKeyRequest) -> Result<bool, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .register_field(doc_type, payload.key.as_str())
        .map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn view_unregister(state: State<'_, DeskState>, payload: ViewKeyRequest) -> Result<bool, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .unregister_field(doc_type, payload.key.as_str())
        .map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn view_snapshot(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<FlatMap, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session
        .snapshot(doc_type)
        .map_err(|err| err.to_string())
}

#[tauri::command]
fn view_apply(
    state: State<'_, DeskState>,
    payload: QuoteTypeRequest,
) -> Result<ApplyReport, String> {
    let mut desk = lock_desk(&state)?;
    let doc_type = quote_type_or(payload.quote_type.as_deref(), desk.session.current_type())?;
    desk.session.apply(doc_type).map_err(|err| err.to_string())
}

#[tauri::command]
fn data_flatten(payload: FlattenRequest) -> FlatMap {
    flatten_data(&payload.data)
}

#[tauri::command]
fn data_unflatten(payload: UnflattenRequest) -> serde_json::Value {
    unflatten_data(&payload.fields)
}

#[tauri::command]
fn field_get(
    state: State<'_, DeskState>,
    payload: FieldGetRequest,
) -> Result<Option<String>, String> {
    let desk = lock_desk(&state)?;
    Ok(desk.backend.get_field(payload.key.as_str()))
}

#[tauri::command]
fn field_set(state: State<'_, DeskState>, payload: FieldSetRequest) -> Result<bool, String> {
    let mut desk = lock_desk(&state)?;
    desk.backend
        .set_field(payload.key.as_str(), payload.value.as_str());
    Ok(true)
}

#[tauri::command]
fn quote_open(state: State<'_, DeskState>) -> Result<QuoteFileResult, String> {
    let path = rfd::FileDialog::new()
        .add_filter("Quote", &[QUOTE_EXTENSION])
        .pick_file();
    let Some(path) = path else {
        return Ok(QuoteFileResult::canceled());
    };

    let mut guard = lock_desk(&state)?;
    let desk = &mut *guard;
    match desk.session.open_document(&mut desk.backend, path.as_path()) {
        Ok(outcome) => {
            desk.path = Some(path.clone());
            Ok(QuoteFileResult {
                ok: true,
                canceled: false,
                path: Some(path.to_string_lossy().to_string()),
                quote_type: Some(outcome.doc_type),
                error: None,
            })
        }
        Err(err) => Ok(QuoteFileResult::failed(path.as_path(), err)),
    }
}

#[tauri::command]
fn quote_save(
    app: AppHandle,
    state: State<'_, DeskState>,
    payload: QuoteSaveRequest,
) -> Result<QuoteFileResult, String> {
    let (known, doc_type) = {
        let desk = lock_desk(&state)?;
        (desk.path.clone(), desk.session.current_type())
    };
    let target = match known {
        Some(path) if !payload.save_as.unwrap_or(false) => Some(path),
        _ => {
            let default_name = payload
                .filename
                .as_deref()
                .map(sanitize_filename)
                .unwrap_or_else(|| DEFAULT_QUOTE_NAME.to_string());
            rfd::FileDialog::new()
                .add_filter("Quote", &[QUOTE_EXTENSION])
                .set_file_name(default_name.as_str())
                .save_file()
        }
    };
    let Some(path) = target.map(with_quote_extension) else {
        return Ok(QuoteFileResult::canceled());
    };

    let mut guard = lock_desk(&state)?;
    let desk = &mut *guard;
    if let Err(err) = desk.session.save_document(&mut desk.backend, path.as_path()) {
        return Ok(QuoteFileResult::failed(path.as_path(), err));
    }
    desk.path = Some(path.clone());
    write_backup_copy(&app, path.as_path());
    Ok(QuoteFileResult {
        ok: true,
        canceled: false,
        path: Some(path.to_string_lossy().to_string()),
        quote_type: Some(doc_type),
        error: None,
    })
}

#[tauri::command]
fn open_backup_folder(app: AppHandle) -> Result<bool, String> {
    let dir = backup_dir(&app)?;
    fs::create_dir_all(dir.as_path()).map_err(|err| err.to_string())?;
    app.opener()
        .open_path(dir.to_string_lossy().to_string(), Option::<String>::None)
        .map_err(|err: tauri_plugin_opener::Error| err.to_string())?;
    Ok(true)
}

fn lock_desk<'a>(state: &'a DeskState) -> Result<MutexGuard<'a, Desk>, String> {
    state
        .0
        .lock()
        .map_err(|_| "Quote session is unavailable.".to_string())
}

fn quote_type_or(value: Option<&str>, fallback: DocumentType) -> Result<DocumentType, String> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(fallback);
    };
    DocumentType::parse(value).ok_or_else(|| format!("Unknown quote type '{value}'."))
}

fn form_result(desk: &Desk, doc_type: DocumentType) -> QuoteFormResult {
    QuoteFormResult {
        quote_type: doc_type,
        dirty: desk.session.is_dirty(),
        path: desk
            .path
            .as_ref()
            .map(|path| path.to_string_lossy().to_string()),
        sections: desk.session.form_view(doc_type),
        collections: desk.session.collections(doc_type),
    }
}

fn with_quote_extension(path: PathBuf) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(QUOTE_EXTENSION));
    if has_extension {
        path
    } else {
        let mut raw = path.into_os_string();
        raw.push(".");
        raw.push(QUOTE_EXTENSION);
        PathBuf::from(raw)
    }
}

fn sanitize_filename(value: &str) -> String {
    let mut out = String::new();
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == ' ' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches(|ch| ch == '_' || ch == ' ');
    if trimmed.is_empty() {
        DEFAULT_QUOTE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_backup_copy(app: &AppHandle, saved: &Path) {
    let Some(name) = saved.file_name() else {
        return;
    };
    let dir = match backup_dir(app) {
        Ok(dir) => dir,
        Err(err) => {
            tracing::warn!(error = err.as_str(), "backup folder unavailable");
            return;
        }
    };
    let copy = fs::create_dir_all(dir.as_path()).and_then(|_| fs::copy(saved, dir.join(name)));
    if let Err(err) = copy {
        tracing::warn!(error = %err, "backup copy failed");
    }
}

fn backup_dir(app: &AppHandle) -> Result<PathBuf, String> {
    let root = storage_root_dir(app)?;
    Ok(AppSettings::load(root.as_path()).backup_dir(root.as_path()))
}

fn storage_root_dir(app: &AppHandle) -> Result<PathBuf, String> {
    static RESOLVED_ROOT: OnceLock<PathBuf> = OnceLock::new();
    if let Some(root) = RESOLVED_ROOT.get() {
        return Ok(root.clone());
    }
    let base = app.path().app_data_dir().map_err(|err| err.to_string())?;
    let root = base.join(APP_DIR);
    fs::create_dir_all(root.as_path()).map_err(|err| err.to_string())?;
    let _ = RESOLVED_ROOT.set(root.clone());
    Ok(root)
}

fn main() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let root = storage_root_dir(app.handle())?;
            let settings = AppSettings::load(root.as_path());
            let guard = logging::init(
                AppSettings::log_dir(root.as_path()).as_path(),
                settings.log_level.as_str(),
            );
            app.manage(LogState(Mutex::new(guard)));

            let mut desk = Desk::default();
            desk.session
                .new_document(&mut desk.backend, settings.default_quote_type)?;
            app.manage(DeskState(Mutex::new(desk)));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            app_version,
            platform_name,
            quote_categories,
            quote_special_lists,
            quote_form,
            quote_new,
            quote_switch_type,
            quote_field_changed,
            quote_entry_add,
            quote_entry_delete,
            quote_reconcile,
            view_register,
            view_unregister,
            view_snapshot,
            view_apply,
            data_flatten,
            data_unflatten,
            field_get,
            field_set,
            quote_open,
            quote_save,
            open_backup_folder
        ])
        .run(tauri::generate_context!())
        .expect("failed to run Quote Desk");
}
