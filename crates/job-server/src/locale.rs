//! Turkish-locale error message boundary (spec.md §7: "User-visible Turkish
//! error messages are rendered at the boundary; internal codes are English
//! and stable").
//!
//! Internal error codes (`ERR-JOB-422`, `invalid_signature`, ...) never
//! change shape; this module only attaches a Turkish display string to each
//! one for the HTTP response body. Nothing upstream of this boundary ever
//! sees these strings.

/// Turkish display text for a stable job-error wire code.
pub fn job_error_text(code: &str) -> &'static str {
    match code {
        "ERR-JOB-400" => "Geçersiz iş türü.",
        "ERR-JOB-422" => "Gönderilen veriler doğrulanamadı.",
        "ERR-JOB-409" => "Bu istek daha önce işlenmiş veya çakışıyor.",
        "ERR-JOB-413" => "Gönderilen veri boyutu izin verilen sınırı aşıyor.",
        "ERR-JOB-429" => "Çok fazla istek gönderildi, lütfen daha sonra tekrar deneyin.",
        "ERR-JOB-500" => "Beklenmeyen bir hata oluştu.",
        _ => "Bilinmeyen bir hata oluştu.",
    }
}

/// Turkish display text for a stable webhook wire code.
pub fn webhook_error_text(code: &str) -> &'static str {
    match code {
        "invalid_signature" => "İmza doğrulanamadı.",
        "missing_event_id" => "Olay kimliği eksik.",
        "missing_payment_id" => "Ödeme kimliği eksik.",
        "payment_not_found" => "Ödeme bulunamadı.",
        "idempotency_error" => "Bu bildirim zaten işlenmiş durumda.",
        "critical_processing_error" => "Bildirim işlenirken kritik bir hata oluştu.",
        _ => "Bilinmeyen bir hata oluştu.",
    }
}

/// Turkish display text for a lifecycle error, keyed by a short internal
/// code rather than the `Display` message (which may embed identifiers not
/// meant for end users).
pub fn lifecycle_error_text(code: &str) -> &'static str {
    match code {
        "NOT_FOUND" => "İş bulunamadı.",
        "TERMINAL" => "İş zaten tamamlanmış, bu işlem artık geçerli değil.",
        "INVALID_TRANSITION" => "Bu durum değişikliği şu anda geçerli değil.",
        _ => "Bilinmeyen bir hata oluştu.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_code_falls_back_to_generic_text() {
        assert_eq!(job_error_text("ERR-JOB-999"), "Bilinmeyen bir hata oluştu.");
    }

    #[test]
    fn known_codes_have_distinct_text() {
        assert_ne!(job_error_text("ERR-JOB-400"), job_error_text("ERR-JOB-422"));
    }
}
