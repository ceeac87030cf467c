//! src/platform.rs
//! Wąski interfejs do platformy czatu. Rdzeń (klasyfikator, workflow, menu) zna tylko ten
//! trait; implementacja Discord siedzi w `discord::SerenityPlatform`, w testach – fake.

use anyhow::Result;
use async_trait::async_trait;

use crate::permissions::PermissionSet;

/// Migawka profilu użytkownika – pobierana per decyzja, nie cache'ujemy (bio się zmienia).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub id: u64,
    pub first_name: String,
    pub last_name: Option<String>,
    /// Handle / username (bez `@`).
    pub username: Option<String>,
    pub is_premium: bool,
    pub bio: Option<String>,
}

impl Profile {
    /// Nazwa do wiadomości: wzmianka, jeśli platforma ją wspiera.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Wskazanie konkretnej wiadomości (kanał + id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: u64,
    pub message_id: u64,
}

/// Dokąd wysłać wiadomość.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Prywatna rozmowa z użytkownikiem.
    User(u64),
    /// Kanał/czat (np. ten, w którym padła wiadomość).
    Chat(u64),
}

/// Przycisk z tokenem callbacku (`verb:arg1:arg2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Wiersze przycisków.
pub type Keyboard = Vec<Vec<Button>>;

/// Uchwyt interakcji (kliknięcia), na którą trzeba odpowiedzieć.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: u64,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmpoweredMember {
    pub user_id: u64,
    pub is_bot: bool,
    pub is_owner: bool,
    /// Czy może nadawać uprawnienia innym (promować).
    pub can_grant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInfo {
    pub title: String,
    pub link: Option<String>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Id konta moderatora (bota).
    fn self_id(&self) -> u64;

    async fn get_profile(&self, user_id: u64) -> Result<Profile>;

    async fn set_permissions(&self, group_id: u64, user_id: u64, perms: PermissionSet) -> Result<()>;

    async fn delete_message(&self, group_id: u64, message: MessageRef) -> Result<()>;

    async fn send_message(&self, target: Target, text: &str, keyboard: Keyboard) -> Result<MessageRef>;

    async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Keyboard) -> Result<()>;

    async fn list_empowered_members(&self, group_id: u64) -> Result<Vec<EmpoweredMember>>;

    /// Jeden członek, jeśli ma uprawnienia. Platformy z tanim odczytem pojedynczego
    /// członka powinny to nadpisać zamiast przechodzić całą listę.
    async fn empowered_member(&self, group_id: u64, user_id: u64) -> Result<Option<EmpoweredMember>> {
        let members = self.list_empowered_members(group_id).await?;
        Ok(members.into_iter().find(|m| m.user_id == user_id))
    }

    /// Odpowiedź na kliknięcie. Pusty `text` = samo potwierdzenie.
    async fn answer_interaction(&self, interaction: &InteractionRef, text: &str, alert: bool) -> Result<()>;

    async fn group_info(&self, group_id: u64) -> Result<GroupInfo>;
}
