mod mock_llm;
