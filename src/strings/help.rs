//! # Help Text
//!
//! Help message for the bot commands.
//! Displayed to the user via the `!help` command.

pub const MAIN: &str = concat!(
    "**📮 Postman Help**\n",
    "Use: !command _args_\n",
    "\n",
    "**🌐 Requests**\n",
    "* postman <method> <url> [\"key:value\" ...]: Send an API request\n",
    "* methods: get, post, put, delete\n",
    "* `auth:<token>` sends `Authorization: Bearer <token>`\n",
    "* `h:<Name>:<value>` or a known header name sets a header\n",
    "* `body:<text>` sends a raw body (post/put)\n",
    "* other pairs become query parameters (get/delete) or JSON fields (post/put)\n",
    "* --raw: show the body unformatted\n",
    "* --headers: show every response header\n",
    "\n",
    "**⚡ Misc**\n",
    "* help\n",
    "* status\n",
    "\n",
    "Redact (delete) your command message to cancel a request in flight.\n"
);
