use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "start the bot.")]
    Start,
    #[command(description = "show this help.")]
    Help,
    #[command(description = "your activity today.")]
    Me,
    #[command(description = "today's most active members.")]
    Top,
    #[command(description = "what's new in the bot.")]
    ReleaseNotes,
    #[command(description = "cancel the current dialogue.")]
    Cancel,
}

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(
    rename_rule = "lowercase",
    description = "Admin commands (reply to a member's message or name them as @username):"
)]
pub enum AdminCommand {
    #[command(description = "warn a member.")]
    Warn(String),
    #[command(description = "apply the next punishment step.")]
    Punish(String),
    #[command(description = "mute a member, e.g. /mute 10m flood.")]
    Mute(String),
    #[command(description = "lift a mute.")]
    Unmute(String),
    #[command(description = "ban a member.")]
    Ban(String),
    #[command(description = "lift a ban.")]
    Unban(String),
    #[command(description = "reset a member's punishment level.")]
    Amnesty(String),
    #[command(description = "show a member's punishment history.")]
    History(String),
    #[command(description = "newcomer verification: on or off.")]
    Antibot(String),
    #[command(description = "daily reports: on or off.")]
    Reports(String),
    #[command(description = "today's report right now.")]
    Report,
    #[command(description = "greet newcomers with a template, or off.")]
    Welcome(String),
    #[command(description = "send a template.")]
    Template(String),
    #[command(description = "list templates.")]
    Templates,
    #[command(description = "create or replace a template.")]
    NewTemplate,
    #[command(description = "delete a template.")]
    DelTemplate(String),
    #[command(description = "publish release notes (bot operators only).")]
    NewRelease,
}
