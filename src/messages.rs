//! User-facing texts. The deployment is Russian-speaking, so every string a
//! user can see lives here in one place.

/// Greeting sent in response to a start/reset action.
pub const GREETING: &str =
    "Привет! Отправь мне сообщение, и я передам его модели. \
     Время ответа как правило до 20 секунд.";

/// Static command list for the help action.
pub const HELP_TEXT: &str = "Команды:\n\
    /start - Начать заново и сбросить контекст.\n\
    /help - Показать эту помощь.\n\
    Нажми \"Новый запрос\" для сброса контекста.";

/// Returned when the endpoint answered 2xx but the body had no `response`.
pub const NO_ANSWER_FALLBACK: &str = "Ошибка: нет ответа от сервера.";

/// Returned on any relay failure (network, timeout, non-2xx, bad body).
pub const SERVER_ERROR_FALLBACK: &str =
    "Извини, произошла ошибка при обращении к серверу.";

/// Toast shown when the "new query" button is pressed.
pub const RESET_NOTICE: &str = "Контекст сброшен! Отправь новое сообщение.";

/// Text the originating message is edited to after a reset via button.
pub const RESET_CONFIRMATION: &str = "Контекст сброшен. Начни новый запрос.";

/// Label on the reset button.
pub const NEW_QUERY_LABEL: &str = "Новый запрос";

/// Callback payload carried by the reset button.
pub const NEW_QUERY_CALLBACK: &str = "new_query";
