//! User-facing texts. The bot speaks Brazilian Portuguese.

pub const REJECTION: &str = "❌ Desculpe, você não tem permissão para usar este bot.";

pub const USAGE_HINT: &str = "Por favor, digite o que deseja pesquisar.\nEx: pesquisar Python";

pub const COMPLETION_FAILED: &str = "❌ Ocorreu um erro ao processar a sua pergunta. Verifique a sua chave de API ou tente novamente num instante.";

pub const COMPLETION_NOT_CONFIGURED: &str =
    "⚠️ A funcionalidade de IA não está configurada corretamente.";

pub const HISTORY_CLEARED: &str =
    "🤖 O histórico da nossa conversa foi limpo. Podemos começar uma nova!";

/// Welcome and help text (Markdown).
pub fn welcome(first_name: Option<&str>) -> String {
    let name = first_name.filter(|n| !n.trim().is_empty()).unwrap_or("usuário");
    format!(
        "👋 Olá {name}! Eu sou a Yara, sua assistente de pesquisas com a IA Llama 3 (via Groq).\n\n\
         As minhas respostas são super rápidas! Mantenho o contexto da nossa conversa. \
         Se quiser começar de novo, use o comando /reset.\n\n\
         **Comandos:**\n\
         \x20 `pesquisar <termo>` - Para buscar na Wikipedia\n\
         \x20 `/ajuda` - Para ver esta mensagem\n\
         \x20 `/reset` - Para limpar a memória da conversa"
    )
}

pub fn searching(term: &str) -> String {
    format!("🔎 Pesquisando por '{term}' na Wikipedia...")
}

pub fn not_found(term: &str) -> String {
    format!("❌ Não encontrei resultados para '{term}'.\nTente termos mais específicos.")
}

/// Lookup reply (Markdown): title, truncated extract, source link.
pub fn lookup_reply(term: &str, text: &str, url: &str, max_chars: usize) -> String {
    let excerpt: String = text.chars().take(max_chars).collect();
    format!(
        "📚 *{}*\n\n{excerpt}...\n\n🔗 *Leia mais:* {url}",
        capitalize(term)
    )
}

/// Upper-case the first character and lower-case the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
