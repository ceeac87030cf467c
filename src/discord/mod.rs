// src/discord/mod.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::engine::CallbackEvent;
use crate::i18n;
use crate::permissions::PermissionSet;
use crate::platform::{
    self, EmpoweredMember, GroupInfo, InteractionRef, Keyboard, MessageRef, Platform, Profile, Target,
};

/// Discord pozwala na timeout maksymalnie 28 dni.
const TIMEOUT_DAYS: i64 = 27;
/// Limity komponentów: 5 wierszy po 5 przycisków.
const MAX_ROWS: usize = 5;
const MAX_BUTTONS: usize = 5;
const MEMBERS_PAGE: u64 = 1000;

const REGISTER_ATTEMPTS: u32 = 3;
const REGISTER_BACKOFF: Duration = Duration::from_secs(30);

/* ============================================================
   PLATFORMA (HTTP)
   ============================================================ */

pub struct SerenityPlatform {
    http: Arc<Http>,
    self_id: u64,
}

impl SerenityPlatform {
    /// Pobiera id bota – bez tego nie rozpoznamy siebie na liście adminów.
    pub async fn connect(http: Arc<Http>) -> Result<Self> {
        let me = http.get_current_user().await?;
        tracing::info!(uid = me.id.get(), name = %me.name, "moderator account resolved");
        Ok(Self {
            http,
            self_id: me.id.get(),
        })
    }

}

/// Profil z obiektu użytkownika Discorda; `nick` (ksywka w gildii) jako drugie pole nazwy.
/// Bio nie jest dostępne dla botów.
pub fn profile_from_user(user: &User, nick: Option<&str>) -> Profile {
    Profile {
        id: user.id.get(),
        first_name: user.global_name.clone().unwrap_or_else(|| user.name.clone()),
        last_name: nick.map(str::to_string),
        username: Some(user.name.clone()),
        is_premium: user.premium_type != PremiumType::None,
        bio: None,
    }
}

fn action_rows(kb: Keyboard) -> Vec<CreateActionRow> {
    kb.into_iter()
        .filter(|row| !row.is_empty())
        .take(MAX_ROWS)
        .map(|row| {
            CreateActionRow::Buttons(
                row.into_iter()
                    .take(MAX_BUTTONS)
                    .map(|b: platform::Button| {
                        CreateButton::new(b.token)
                            .label(b.label)
                            .style(ButtonStyle::Secondary)
                    })
                    .collect(),
            )
        })
        .collect()
}

fn member_permissions(guild: &PartialGuild, member: &Member) -> Permissions {
    // @everyone ma id równe id gildii
    let everyone = RoleId::new(guild.id.get());
    let mut perms = guild
        .roles
        .get(&everyone)
        .map(|r| r.permissions)
        .unwrap_or_else(Permissions::empty);
    for rid in &member.roles {
        if let Some(role) = guild.roles.get(rid) {
            perms |= role.permissions;
        }
    }
    perms
}

/// `None`, gdy członek nie ma żadnego z uprawnień moderatorskich.
fn empowered_from(guild: &PartialGuild, member: &Member) -> Option<EmpoweredMember> {
    let is_owner = member.user.id == guild.owner_id;
    let perms = member_permissions(guild, member);
    let admin = perms.contains(Permissions::ADMINISTRATOR);
    let empowered = is_owner
        || admin
        || perms.contains(Permissions::MANAGE_GUILD)
        || perms.contains(Permissions::MODERATE_MEMBERS);
    empowered.then(|| EmpoweredMember {
        user_id: member.user.id.get(),
        is_bot: member.user.bot,
        is_owner,
        can_grant: is_owner || admin || perms.contains(Permissions::MANAGE_ROLES),
    })
}

#[async_trait]
impl Platform for SerenityPlatform {
    fn self_id(&self) -> u64 {
        self.self_id
    }

    async fn get_profile(&self, user_id: u64) -> Result<Profile> {
        let user = self.http.get_user(UserId::new(user_id)).await?;
        Ok(profile_from_user(&user, None))
    }

    async fn set_permissions(&self, group_id: u64, user_id: u64, perms: PermissionSet) -> Result<()> {
        let builder = if perms.is_restrictive() {
            let until = chrono::Utc::now() + chrono::Duration::days(TIMEOUT_DAYS);
            let ts = Timestamp::from_unix_timestamp(until.timestamp())
                .map_err(|e| anyhow!("timeout timestamp: {e:?}"))?;
            EditMember::new()
                .disable_communication_until_datetime(ts)
                .audit_log_reason("tigris-gatekeeper: restricted")
        } else {
            // Discord nie ma osobnych zestawów tekst/media – zdjęcie timeoutu przywraca role
            EditMember::new()
                .enable_communication()
                .audit_log_reason("tigris-gatekeeper: unrestricted")
        };
        GuildId::new(group_id)
            .edit_member(&self.http, UserId::new(user_id), builder)
            .await?;
        Ok(())
    }

    async fn delete_message(&self, _group_id: u64, message: MessageRef) -> Result<()> {
        ChannelId::new(message.chat_id)
            .delete_message(&self.http, MessageId::new(message.message_id))
            .await?;
        Ok(())
    }

    async fn send_message(&self, target: Target, text: &str, keyboard: Keyboard) -> Result<MessageRef> {
        let channel = match target {
            Target::User(uid) => UserId::new(uid).create_dm_channel(&self.http).await?.id,
            Target::Chat(cid) => ChannelId::new(cid),
        };
        let msg = channel
            .send_message(
                &self.http,
                CreateMessage::new().content(text).components(action_rows(keyboard)),
            )
            .await?;
        Ok(MessageRef {
            chat_id: msg.channel_id.get(),
            message_id: msg.id.get(),
        })
    }

    async fn edit_message(&self, message: MessageRef, text: &str, keyboard: Keyboard) -> Result<()> {
        ChannelId::new(message.chat_id)
            .edit_message(
                &self.http,
                MessageId::new(message.message_id),
                EditMessage::new().content(text).components(action_rows(keyboard)),
            )
            .await?;
        Ok(())
    }

    async fn list_empowered_members(&self, group_id: u64) -> Result<Vec<EmpoweredMember>> {
        let gid = GuildId::new(group_id);
        let guild = self.http.get_guild(gid).await?;

        let mut out = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = gid.members(&self.http, Some(MEMBERS_PAGE), after).await?;
            let full = page.len() as u64 == MEMBERS_PAGE;
            after = page.last().map(|m| m.user.id);

            out.extend(page.iter().filter_map(|m| empowered_from(&guild, m)));

            if !full {
                break;
            }
        }
        Ok(out)
    }

    /// Dwa zapytania zamiast stronicowania całej gildii: kliknięcia muszą zmieścić się
    /// w 3 s na odpowiedź.
    async fn empowered_member(&self, group_id: u64, user_id: u64) -> Result<Option<EmpoweredMember>> {
        let gid = GuildId::new(group_id);
        let guild = self.http.get_guild(gid).await?;
        let member = match self.http.get_member(gid, UserId::new(user_id)).await {
            Ok(m) => m,
            // 404: nie jest członkiem gildii
            Err(serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp)))
                if resp.status_code.as_u16() == 404 =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(empowered_from(&guild, &member))
    }

    async fn answer_interaction(&self, interaction: &InteractionRef, text: &str, alert: bool) -> Result<()> {
        // Discord nie ma "alertów" – oba warianty to wiadomość efemeryczna
        let _ = alert;
        let response = if text.is_empty() {
            CreateInteractionResponse::Acknowledge
        } else {
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            )
        };
        self.http
            .create_interaction_response(
                InteractionId::new(interaction.id),
                &interaction.token,
                &response,
                vec![],
            )
            .await?;
        Ok(())
    }

    async fn group_info(&self, group_id: u64) -> Result<GroupInfo> {
        let guild = self.http.get_guild(GuildId::new(group_id)).await?;
        Ok(GroupInfo {
            title: guild.name,
            link: guild
                .vanity_url_code
                .map(|code| format!("https://discord.gg/{code}")),
        })
    }
}

/* ============================================================
   HANDLER (GATEWAY)
   ============================================================ */

pub struct Handler {
    pub app: Arc<AppContext>,
}

impl Handler {
    async fn on_settings_command(&self, ctx: &Context, cmd: &CommandInteraction) {
        let engine = &self.app.engine;
        let lang = cmd
            .guild_id
            .and_then(|g| engine.registry().cached(g.get()))
            .map(|p| p.language)
            .unwrap_or_else(|| i18n::DEFAULT_LANG.to_string());

        let key = match engine.on_settings_command(cmd.user.id.get()).await {
            Ok(_) => "settings_sent",
            Err(e) => {
                tracing::warn!(error=?e, uid = cmd.user.id.get(), "settings menu DM failed");
                "settings_dm_failed"
            }
        };

        let reply = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(i18n::translate(&lang, key))
                .ephemeral(true),
        );
        if let Err(e) = cmd.create_response(&ctx.http, reply).await {
            tracing::warn!(error=?e, "settings command response failed");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(guilds = ready.guilds.len(), "Logged in as {}", ready.user.name);

        // rejestracja w tle – ready nie może czekać na backoff
        let http = ctx.http.clone();
        tokio::spawn(async move {
            register_commands(&http).await;
        });
    }

    // _is_new zgodnie z Serenity 0.12
    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.app.engine.on_group_seen(guild.id.get()).await;
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        if member.user.bot {
            return;
        }
        let gid = member.guild_id.get();
        let profile = profile_from_user(&member.user, member.nick.as_deref());
        let outcome = self.app.engine.on_member_joined(gid, profile).await;
        tracing::debug!(gid, uid = member.user.id.get(), ?outcome, "JOIN inspected");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(gid) = msg.guild_id else {
            // DM: ewentualna odpowiedź na prompt "podaj ID gildii"
            self.app
                .engine
                .on_private_text(msg.author.id.get(), &msg.content)
                .await;
            return;
        };

        let nick = msg.member.as_ref().and_then(|m| m.nick.as_deref());
        let profile = profile_from_user(&msg.author, nick);
        let message = MessageRef {
            chat_id: msg.channel_id.get(),
            message_id: msg.id.get(),
        };
        let outcome = self.app.engine.on_message(gid.get(), profile, message).await;
        tracing::trace!(gid = gid.get(), uid = msg.author.id.get(), ?outcome, "MESSAGE inspected");
    }

    /// Brama interakcji: slash + komponenty
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let started = Instant::now();

        let fut = async {
            match &interaction {
                Interaction::Component(c) => {
                    let ev = CallbackEvent {
                        interaction: InteractionRef {
                            id: c.id.get(),
                            token: c.token.clone(),
                        },
                        user_id: c.user.id.get(),
                        data: c.data.custom_id.clone(),
                        message: Some(MessageRef {
                            chat_id: c.channel_id.get(),
                            message_id: c.message.id.get(),
                        }),
                    };
                    self.app.engine.on_callback(ev).await;
                }
                Interaction::Command(cmd) if cmd.data.name == "settings" => {
                    self.on_settings_command(&ctx, cmd).await;
                }
                _ => {}
            }
        };

        let result = AssertUnwindSafe(fut).catch_unwind().await;
        if result.is_err() {
            tracing::error!(elapsed_ms = started.elapsed().as_millis() as u64, "interaction handler panicked");
        }
    }

    async fn guild_member_update(
        &self,
        _ctx: Context,
        _old: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if event.user.id.get() == self.app.platform.self_id() {
            self.app
                .engine
                .on_bot_membership_changed(event.guild_id.get())
                .await;
        }
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            "DIRECT_MESSAGES" => i |= GatewayIntents::DIRECT_MESSAGES,
            other => tracing::warn!(intent = other, "unknown gateway intent in config – ignored"),
        }
    }
    i
}

pub async fn run_bot(app: Arc<AppContext>) -> Result<()> {
    let token = &app.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (TGK_DISCORD__TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&app.settings.discord.intents);

    let handler = Handler { app: app.clone() };
    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    let shards = client.shard_manager.clone();
    let on_signal = app.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            on_signal.shutdown();
            shards.shutdown_all().await;
        }
    });

    tracing::info!("Discord client starting…");
    client.start().await?;
    app.shutdown();
    Ok(())
}

/* ============================================================
   REJESTR KOMEND
   ============================================================ */

fn settings_command() -> CreateCommand {
    CreateCommand::new("settings")
        .description("Configure the gatekeeper for groups you administer (sent in DM)")
        .description_localized("pl", "Konfiguracja strażnika dla Twoich gildii (w DM)")
}

/// Globalna komenda `/settings`; 3 próby co 30 s.
async fn register_commands(http: &Http) {
    for attempt in 1..=REGISTER_ATTEMPTS {
        match Command::create_global_command(http, settings_command()).await {
            Ok(cmd) => {
                tracing::info!(id = cmd.id.get(), "global /settings registered");
                return;
            }
            Err(e) if attempt < REGISTER_ATTEMPTS => {
                tracing::warn!(error=?e, attempt, "register /settings failed – retrying");
                tokio::time::sleep(REGISTER_BACKOFF).await;
            }
            Err(e) => tracing::error!(error=?e, "register /settings failed – giving up"),
        }
    }
}
